//! Absent - remove `name:tag` if it exists.

use tracing::debug;

use super::{ReconcileError, Reconciler};

impl Reconciler<'_> {
    pub(super) async fn absent(&mut self) -> Result<(), ReconcileError> {
        let desired = self.desired;
        let Some(image) = self.store.find_image(&desired.name, &desired.tag).await? else {
            debug!("Image `{}` not present, nothing to remove", desired.image_name());
            return Ok(());
        };

        let name = desired.image_name();
        if !self.dry_run() {
            self.store
                .remove_image(&name, desired.force)
                .await
                .map_err(|e| ReconcileError::Remove {
                    name: name.clone(),
                    error: e.to_string(),
                })?;
        }

        self.result.mark_changed();
        self.result.append_action(format!("Removed image `{}`", name));
        self.result.set_image(Some(image.mark_deleted()));
        Ok(())
    }
}
