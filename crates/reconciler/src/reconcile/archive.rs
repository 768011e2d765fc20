//! Archive - stream an image out of the store into a tar file.

use std::path::Path;

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_stream::StreamExt;
use tracing::info;

use super::{ReconcileError, Reconciler};
use crate::desired::name::DEFAULT_TAG;
use crate::docker::client::DockerError;

impl Reconciler<'_> {
    /// Archiving an image that does not exist is a no-op.
    pub(super) async fn archive(
        &mut self,
        name: &str,
        tag: &str,
        archive_path: &Path,
    ) -> Result<(), ReconcileError> {
        let tag = if tag.is_empty() { DEFAULT_TAG } else { tag };

        if self.store.find_image(name, tag).await?.is_none() {
            info!("Archive image: image {}:{} not found", name, tag);
            return Ok(());
        }

        let image_name = format!("{}:{}", name, tag);
        self.result.append_action(format!(
            "Archived image `{}` to `{}`",
            image_name,
            archive_path.display()
        ));
        self.result.mark_changed();

        if !self.dry_run() {
            info!("Getting archive of image `{}`", image_name);
            self.write_archive(&image_name, archive_path).await?;
        }

        if let Some(image) = self.store.find_image(name, tag).await? {
            self.result.set_image(Some(image));
        }
        Ok(())
    }

    async fn write_archive(&self, image_name: &str, archive_path: &Path) -> Result<(), ReconcileError> {
        let read_error = |e: DockerError| ReconcileError::ArchiveRead {
            image: image_name.to_string(),
            error: e.to_string(),
        };
        let write_error = |e: std::io::Error| ReconcileError::ArchiveWrite {
            archive_path: archive_path.to_path_buf(),
            error: e.to_string(),
        };

        let mut chunks = self.store.export_image(image_name);

        // Fetch the first chunk before creating the file so a missing image
        // never leaves an empty archive behind.
        let first = match chunks.next().await {
            Some(chunk) => Some(chunk.map_err(read_error)?),
            None => None,
        };

        let mut file = File::create(archive_path).await.map_err(write_error)?;
        let mut written = 0usize;
        if let Some(chunk) = first {
            file.write_all(&chunk).await.map_err(write_error)?;
            written += chunk.len();
        }
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(read_error)?;
            file.write_all(&chunk).await.map_err(write_error)?;
            written += chunk.len();
        }
        file.flush().await.map_err(write_error)?;

        info!(bytes = written, "Wrote archive `{}`", archive_path.display());
        Ok(())
    }
}
