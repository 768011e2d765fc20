//! Tag - copy `name:tag` into another repository, optionally pushing it.

use tracing::info;

use super::{ReconcileError, Reconciler};
use crate::desired::name::{parse_repository_tag, DEFAULT_TAG};
use crate::docker::client::DockerError;

impl Reconciler<'_> {
    pub(super) async fn tag(
        &mut self,
        name: &str,
        tag: &str,
        repository: &str,
        force: bool,
        push: bool,
    ) -> Result<(), ReconcileError> {
        let (repo, repo_tag) = match parse_repository_tag(repository) {
            (repo, Some(repo_tag)) if !repo_tag.is_empty() => (repo, repo_tag),
            (repo, _) if !tag.is_empty() => (repo, tag.to_string()),
            (repo, _) => (repo, DEFAULT_TAG.to_string()),
        };

        let target = self.store.find_image(&repo, &repo_tag).await?;
        info!(
            found = target.is_some(),
            "Image `{}:{}` was {}",
            repo,
            repo_tag,
            if target.is_some() { "found" } else { "not found" }
        );

        if target.is_some() && !force {
            return Ok(());
        }

        info!("Tagging {}:{} to {}:{}", name, tag, repo, repo_tag);
        self.result
            .append_action(format!("Tagged image {}:{} to {}:{}", name, tag, repo, repo_tag));
        self.result.mark_changed();

        // A dry run reports the tag only; the chained push is not announced.
        if self.dry_run() {
            return Ok(());
        }

        let source = source_name(name, tag);
        // The store is always asked to force; `force` only decides
        // whether an existing target gets tagged at all.
        let tagged = self
            .store
            .tag_image(&source, &repo, &repo_tag, true)
            .await
            .and_then(|ok| if ok { Ok(()) } else { Err(DockerError::TagRejected) });
        if let Err(e) = tagged {
            return Err(ReconcileError::Tag { error: e.to_string() });
        }
        let image = self.store.find_image(&repo, &repo_tag).await?;
        self.result.set_image(image);

        if push {
            self.push(&repo, Some(&repo_tag)).await?;
        }
        Ok(())
    }
}

fn source_name(name: &str, tag: &str) -> String {
    if tag.is_empty() || name.ends_with(&format!(":{}", tag)) {
        name.to_string()
    } else {
        format!("{}:{}", name, tag)
    }
}
