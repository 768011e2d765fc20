//! Push - send an image to the registry named in its repository path.

use tracing::{debug, info};

use super::{ReconcileError, Reconciler};
use crate::desired::name::{parse_repository_tag, resolve_repository_name, DEFAULT_TAG};
use crate::docker::descriptor::ImageDescriptor;
use crate::docker::error_map::map_push_error;

impl Reconciler<'_> {
    /// Push `name` (as `name:tag`, or splitting the tag out of `name` when
    /// none is given). A name without a resolvable registry is not pushed.
    pub(super) async fn push(&mut self, name: &str, tag: Option<&str>) -> Result<(), ReconcileError> {
        let (repository, tag) = match tag {
            Some(tag) if !tag.is_empty() => (name.to_string(), tag.to_string()),
            _ => {
                let (repository, tag) = parse_repository_tag(name);
                (repository, tag.unwrap_or_else(|| DEFAULT_TAG.to_string()))
            }
        };

        let Some((registry, repo_name)) = resolve_repository_name(&repository) else {
            debug!("No registry resolvable for `{}`, not pushing", repository);
            return Ok(());
        };

        info!(
            registry = %registry,
            repo_name = %repo_name,
            "Push `{}` to `{}/{}:{}`",
            self.desired.name,
            registry,
            repo_name,
            tag
        );
        self.result.append_action(format!(
            "Pushed image `{}` to `{}/{}:{}`",
            self.desired.name, registry, repo_name, tag
        ));
        self.result.mark_changed();

        if self.dry_run() {
            return Ok(());
        }

        let store = self.store;
        let summary = self
            .progress(store.push_image(&repository, &tag))
            .drain()
            .await
            .map_err(|(e, _)| map_push_error(&registry, &repo_name, &tag, &repository, &e))?;

        let mut image = store
            .find_image(&repository, &tag)
            .await?
            .unwrap_or_else(ImageDescriptor::default);
        image.push_status = summary.last_status;
        self.result.set_image(Some(image));
        Ok(())
    }
}
