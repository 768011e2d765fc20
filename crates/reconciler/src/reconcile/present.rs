//! Present - make sure the image exists, then archive, tag or push it.
//!
//! The run is an ordered list of guarded steps:
//! 1. look up `name:tag`
//! 2. acquire it (soft pull, then build / load / hard pull) unless it exists
//!    and `force` is off
//! 3. archive
//! 4. tag into `repository`, or push
//! 5. fall back to the existing image for the result

use tracing::{debug, info, warn};

use super::{ReconcileError, Reconciler};
use crate::docker::client::DockerError;
use crate::docker::descriptor::ImageDescriptor;
use crate::docker::error_map::{map_build_error, map_load_error};

/// How step 2 brought the image into the store. Only ever produced when the
/// operation really ran, so dry runs never yield one.
#[derive(Debug, Clone, PartialEq)]
pub enum Acquisition {
    Pulled(ImageDescriptor),
    Built(ImageDescriptor),
    Loaded(ImageDescriptor),
}

impl Acquisition {
    pub fn image(&self) -> &ImageDescriptor {
        match self {
            Acquisition::Pulled(image) | Acquisition::Built(image) | Acquisition::Loaded(image) => image,
        }
    }

    pub fn is_pulled(&self) -> bool {
        matches!(self, Acquisition::Pulled(_))
    }
}

impl Reconciler<'_> {
    pub(super) async fn present(&mut self) -> Result<(), ReconcileError> {
        let desired = self.desired;
        debug!(name = %desired.name, tag = %desired.tag, "Starting state `present`");

        let existing = self.store.find_image(&desired.name, &desired.tag).await?;
        if let Some(image) = &existing {
            info!(id = %image.id, "Found existing image `{}:{}`", desired.name, desired.tag);
        }

        let acquired = if existing.is_none() || desired.force {
            self.acquire(existing.as_ref()).await?
        } else {
            None
        };

        if let Some(archive_path) = &desired.archive_path {
            self.archive(&desired.name, &desired.tag, archive_path).await?;
        }

        if let Some(repository) = &desired.repository {
            self.tag(&desired.name, &desired.tag, repository, desired.force, desired.push)
                .await?;
        } else if desired.push {
            self.push_acquired(acquired.as_ref()).await?;
        }

        if !self.result.has_image() {
            if let Some(image) = existing {
                self.result.set_image(Some(image));
            }
        }
        Ok(())
    }

    /// Step 2. Returns what was actually brought in, if anything.
    async fn acquire(
        &mut self,
        existing: Option<&ImageDescriptor>,
    ) -> Result<Option<Acquisition>, ReconcileError> {
        let desired = self.desired;

        if !desired.force && desired.try_to_pull {
            self.result
                .append_action(format!("Tried to pull image `{}:{}`", desired.name, desired.tag));
            self.result.mark_changed();

            if !self.dry_run() {
                if let Some(pulled) = self.try_pull().await {
                    self.result
                        .append_action(format!("Pulled image `{}:{}`", desired.name, desired.tag));
                    self.result.set_image(Some(pulled.clone()));
                    return Ok(Some(Acquisition::Pulled(pulled)));
                }
            }
        }

        if let Some(path) = &desired.path {
            if !path.is_dir() {
                return Err(ReconcileError::BuildPathMissing { path: path.clone() });
            }
            info!("Building image `{}`", desired.image_name());
            self.result.append_action(format!(
                "Built image `{}` from `{}`",
                desired.image_name(),
                path.display()
            ));
            self.result.mark_changed();

            if self.dry_run() {
                return Ok(None);
            }
            let built = self.build().await?;
            self.result.set_image(Some(built.clone()));
            return Ok(Some(Acquisition::Built(built)));
        }

        if let Some(load_path) = &desired.load_path {
            if !load_path.is_file() {
                return Err(ReconcileError::LoadPathMissing {
                    name: desired.name.clone(),
                    load_path: load_path.clone(),
                });
            }
            self.result.append_action(format!(
                "Loaded image `{}` from `{}`",
                desired.image_name(),
                load_path.display()
            ));
            self.result.mark_changed();

            if self.dry_run() {
                return Ok(None);
            }
            let loaded = self.load().await?;
            self.result.set_image(Some(loaded.clone()));
            return Ok(Some(Acquisition::Loaded(loaded)));
        }

        self.result
            .append_action(format!("Pulled image `{}:{}`", desired.name, desired.tag));
        self.result.mark_changed();

        if self.dry_run() {
            return Ok(None);
        }
        let pulled = self.pull().await?;
        self.result.set_image(Some(pulled.clone()));
        if existing.is_some_and(|e| e.same_image(&pulled)) {
            debug!(id = %pulled.id, "Pulled image is the one already present");
            self.result.changed = false;
        }
        Ok(Some(Acquisition::Pulled(pulled)))
    }

    /// Pull that never fails the run. Any problem is recorded as a warning
    /// and reported as "nothing pulled".
    async fn try_pull(&mut self) -> Option<ImageDescriptor> {
        let desired = self.desired;
        info!("Attempting to pull image {}:{}", desired.name, desired.tag);

        let store = self.store;
        let stream = self.progress(store.pull_image(&desired.name, &desired.tag));
        if let Err((e, _)) = stream.drain().await {
            self.soft_pull_failed(&e);
            return None;
        }

        match store.find_image(&desired.name, &desired.tag).await {
            Ok(found) => found,
            Err(e) => {
                self.soft_pull_failed(&e);
                None
            }
        }
    }

    fn soft_pull_failed(&mut self, e: &DockerError) {
        let desired = self.desired;
        warn!("Attempt to pull {}:{} failed: {}", desired.name, desired.tag, e);
        self.result.warn(format!(
            "Attempt to pull {}:{} failed - {}",
            desired.name, desired.tag, e
        ));
    }

    async fn pull(&mut self) -> Result<ImageDescriptor, ReconcileError> {
        let desired = self.desired;
        let store = self.store;
        let pull_error = |error: String| ReconcileError::Pull {
            name: desired.name.clone(),
            error,
        };

        self.progress(store.pull_image(&desired.name, &desired.tag))
            .drain()
            .await
            .map_err(|(e, _)| pull_error(e.to_string()))?;

        store
            .find_image(&desired.name, &desired.tag)
            .await?
            .ok_or_else(|| pull_error(format!("image {} not found after pull", desired.image_name())))
    }

    async fn build(&mut self) -> Result<ImageDescriptor, ReconcileError> {
        let desired = self.desired;
        let store = self.store;
        let Some(path) = desired.path.as_deref() else {
            return Err(ReconcileError::InvalidDesiredState("no build path".to_string()));
        };

        let request = desired.build_request(path);
        debug!(tag = %request.tag, dockerfile = %request.dockerfile, nocache = request.nocache, "Building");

        self.progress(store.build_image(request))
            .drain()
            .await
            .map_err(|(e, summary)| map_build_error(&desired.name, e, summary.output))?;

        store
            .find_image(&desired.name, &desired.tag)
            .await?
            .ok_or_else(|| DockerError::ImageNotFound(desired.image_name()).into())
    }

    async fn load(&mut self) -> Result<ImageDescriptor, ReconcileError> {
        let desired = self.desired;
        let store = self.store;
        let Some(load_path) = desired.load_path.as_deref() else {
            return Err(ReconcileError::InvalidDesiredState("no load path".to_string()));
        };

        info!("Loading image from `{}`", load_path.display());
        self.progress(store.load_image(load_path))
            .drain()
            .await
            .map_err(|(e, _)| map_load_error(&desired.name, load_path, e))?;

        store
            .find_image(&desired.name, &desired.tag)
            .await?
            .ok_or_else(|| DockerError::ImageNotFound(desired.image_name()).into())
    }

    /// Step 4 without a repository: only push what this run produced.
    async fn push_acquired(&mut self, acquired: Option<&Acquisition>) -> Result<(), ReconcileError> {
        let desired = self.desired;
        match acquired {
            Some(pulled) if pulled.is_pulled() => {
                debug!(id = %pulled.image().id, "Image was pulled from registry, not pushing");
                Ok(())
            }
            _ if desired.force => {
                info!("Forcing push of image `{}:{}`", desired.name, desired.tag);
                self.push(&desired.name, Some(&desired.tag)).await
            }
            Some(Acquisition::Built(image)) | Some(Acquisition::Loaded(image)) => {
                info!(id = %image.id, "Pushing acquired image `{}:{}`", desired.name, desired.tag);
                self.push(&desired.name, Some(&desired.tag)).await
            }
            _ => {
                info!("No image built or loaded, not pushing");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{image, sink};
    use crate::client::fake::{FakeImageStore, StoreCall};
    use crate::desired::DesiredState;
    use crate::reconcile::{reconcile, ReconcileError};

    fn desired(name: &str) -> DesiredState {
        DesiredState::new(name)
    }

    #[tokio::test]
    async fn test_existing_image_is_idempotent() {
        let store = FakeImageStore::new();
        store.add_image(image("sha256:a", &["app:latest"])).await;

        let result = reconcile(&store, sink(), desired("app")).await.unwrap();
        assert!(!result.changed);
        assert!(result.actions.is_empty());
        assert_eq!(result.image.map(|i| i.id), Some("sha256:a".to_string()));
        assert!(store.mutating_calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_existing_image_with_push_but_nothing_acquired() {
        let store = FakeImageStore::new();
        store.add_image(image("sha256:a", &["reg.local/app:latest"])).await;

        let mut d = desired("reg.local/app");
        d.push = true;

        let result = reconcile(&store, sink(), d).await.unwrap();
        assert!(!result.changed);
        assert!(store.mutating_calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_fresh_try_pull() {
        let store = FakeImageStore::new();
        store.add_registry_image(image("sha256:r", &["app:latest"])).await;

        let result = reconcile(&store, sink(), desired("app")).await.unwrap();
        assert!(result.changed);
        assert_eq!(
            result.actions,
            vec!["Tried to pull image `app:latest`", "Pulled image `app:latest`"]
        );
        assert_eq!(result.image.map(|i| i.id), Some("sha256:r".to_string()));
    }

    #[tokio::test]
    async fn test_fresh_plain_pull_without_try() {
        let store = FakeImageStore::new();
        store.add_registry_image(image("sha256:r", &["app:latest"])).await;

        let mut d = desired("app");
        d.try_to_pull = false;

        let result = reconcile(&store, sink(), d).await.unwrap();
        assert!(result.changed);
        assert_eq!(result.actions, vec!["Pulled image `app:latest`"]);
        assert_eq!(result.image.map(|i| i.id), Some("sha256:r".to_string()));
        assert_eq!(
            store.mutating_calls().await,
            vec![StoreCall::Pull { name: "app".into(), tag: "latest".into() }]
        );
    }

    #[tokio::test]
    async fn test_forced_pull_of_same_image_is_unchanged() {
        let store = FakeImageStore::new();
        store.add_image(image("sha256:a", &["app:latest"])).await;
        store.add_registry_image(image("sha256:a", &["app:latest"])).await;

        let mut d = desired("app");
        d.force = true;

        let result = reconcile(&store, sink(), d).await.unwrap();
        assert!(!result.changed);
        assert_eq!(result.actions, vec!["Pulled image `app:latest`"]);
    }

    #[tokio::test]
    async fn test_forced_pull_of_newer_image_is_changed() {
        let store = FakeImageStore::new();
        store.add_image(image("sha256:old", &["app:latest"])).await;
        store.add_registry_image(image("sha256:new", &["app:latest"])).await;

        let mut d = desired("app");
        d.force = true;

        let result = reconcile(&store, sink(), d).await.unwrap();
        assert!(result.changed);
        assert_eq!(result.image.map(|i| i.id), Some("sha256:new".to_string()));
    }

    #[tokio::test]
    async fn test_hard_pull_failure_is_fatal() {
        let store = FakeImageStore::new();
        let mut d = desired("ghost");
        d.try_to_pull = false;

        let failure = reconcile(&store, sink(), d).await.unwrap_err();
        assert!(matches!(failure.error, ReconcileError::Pull { .. }));
        assert!(failure.to_string().starts_with("Error pulling ghost - pull access denied"));
        assert_eq!(failure.partial.actions, vec!["Pulled image `ghost:latest`"]);
        assert!(failure.partial.changed);
    }

    #[tokio::test]
    async fn test_build_after_failed_try_pull() {
        let store = FakeImageStore::new();
        let ctx = tempfile::tempdir().unwrap();

        let mut d = desired("app");
        d.path = Some(ctx.path().to_path_buf());

        let result = reconcile(&store, sink(), d).await.unwrap();
        assert!(result.changed);
        assert_eq!(
            result.actions,
            vec![
                "Tried to pull image `app:latest`".to_string(),
                format!("Built image `app:latest` from `{}`", ctx.path().display()),
            ]
        );
        let built = result.image.unwrap();
        assert!(built.id.starts_with("sha256:built"));
        assert!(built.has_tag("app:latest"));
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].starts_with("Attempt to pull app:latest failed"));
    }

    #[tokio::test]
    async fn test_build_failure_carries_logs() {
        let store = FakeImageStore::new();
        store.fail_build(Some(1), "COPY failed: no such file").await;
        let ctx = tempfile::tempdir().unwrap();

        let mut d = desired("app");
        d.path = Some(ctx.path().to_path_buf());
        d.try_to_pull = false;

        let failure = reconcile(&store, sink(), d).await.unwrap_err();
        match &failure.error {
            ReconcileError::BuildDetail { code, message, logs, .. } => {
                assert_eq!(code, "1");
                assert_eq!(message, "COPY failed: no such file");
                assert_eq!(logs, &vec!["Step 1/2 : FROM scratch\n".to_string()]);
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(failure.partial.changed);
        assert_eq!(failure.partial.actions.len(), 1);
    }

    #[tokio::test]
    async fn test_build_failure_without_code() {
        let store = FakeImageStore::new();
        store.fail_build(None, "daemon went away").await;
        let ctx = tempfile::tempdir().unwrap();

        let mut d = desired("app");
        d.path = Some(ctx.path().to_path_buf());
        d.try_to_pull = false;

        let failure = reconcile(&store, sink(), d).await.unwrap_err();
        assert!(failure
            .to_string()
            .starts_with("Error building app - message: daemon went away, logs: "));
    }

    #[tokio::test]
    async fn test_load_from_archive() {
        let store = FakeImageStore::new();
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("app.tar");
        std::fs::write(&archive, b"tar").unwrap();
        store.add_archive(&archive, image("sha256:l", &["app:v1"])).await;

        let mut d = desired("app:v1");
        d.load_path = Some(archive.clone());
        d.try_to_pull = false;

        let result = reconcile(&store, sink(), d).await.unwrap();
        assert!(result.changed);
        assert_eq!(
            result.actions,
            vec![format!("Loaded image `app:v1` from `{}`", archive.display())]
        );
        assert_eq!(result.image.map(|i| i.id), Some("sha256:l".to_string()));
    }

    #[tokio::test]
    async fn test_load_rejected_by_daemon() {
        let store = FakeImageStore::new();
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.tar");
        std::fs::write(&archive, b"junk").unwrap();

        let mut d = desired("app");
        d.load_path = Some(archive);
        d.try_to_pull = false;

        let failure = reconcile(&store, sink(), d).await.unwrap_err();
        assert_eq!(failure.to_string(), "Error loading image app - invalid tar header");
    }

    #[tokio::test]
    async fn test_never_push_a_pulled_image() {
        let store = FakeImageStore::new();
        store.add_registry_image(image("sha256:r", &["reg.local/app:latest"])).await;

        let mut d = desired("reg.local/app");
        d.push = true;

        let result = reconcile(&store, sink(), d).await.unwrap();
        assert!(result.changed);
        assert!(!store
            .calls()
            .await
            .iter()
            .any(|c| matches!(c, StoreCall::Push { .. })));
    }

    #[tokio::test]
    async fn test_forced_pull_is_never_pushed() {
        let store = FakeImageStore::new();
        store.add_image(image("sha256:a", &["reg.local/app:latest"])).await;
        store.add_registry_image(image("sha256:b", &["reg.local/app:latest"])).await;

        let mut d = desired("reg.local/app");
        d.push = true;
        d.force = true;

        reconcile(&store, sink(), d).await.unwrap();
        assert!(!store
            .calls()
            .await
            .iter()
            .any(|c| matches!(c, StoreCall::Push { .. })));
    }

    #[tokio::test]
    async fn test_built_image_is_pushed() {
        let store = FakeImageStore::new();
        let ctx = tempfile::tempdir().unwrap();

        let mut d = desired("reg.local/team/app:v1");
        d.path = Some(ctx.path().to_path_buf());
        d.push = true;

        let result = reconcile(&store, sink(), d).await.unwrap();
        assert_eq!(
            result.actions.last().map(String::as_str),
            Some("Pushed image `reg.local/team/app` to `reg.local/team/app:v1`")
        );
        let pushed = result.image.unwrap();
        assert_eq!(pushed.push_status.as_deref(), Some("v1: digest: sha256:fake size: 1234"));
        assert!(store
            .mutating_calls()
            .await
            .contains(&StoreCall::Push { repo: "reg.local/team/app".into(), tag: "v1".into() }));
    }

    #[tokio::test]
    async fn test_forced_push_of_existing_build_context() {
        let store = FakeImageStore::new();
        store.add_image(image("sha256:a", &["reg.local/app:latest"])).await;
        let ctx = tempfile::tempdir().unwrap();

        let mut d = desired("reg.local/app");
        d.path = Some(ctx.path().to_path_buf());
        d.force = true;
        d.push = true;

        let result = reconcile(&store, sink(), d).await.unwrap();
        let mutating = store.mutating_calls().await;
        assert!(matches!(mutating[0], StoreCall::Build { .. }));
        assert!(matches!(mutating[1], StoreCall::Push { .. }));
        // Forced runs skip the soft pull entirely.
        assert!(!result.actions.iter().any(|a| a.starts_with("Tried")));
    }

    #[tokio::test]
    async fn test_dry_run_is_pure() {
        let store = FakeImageStore::new();
        let ctx = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();

        let mut d = desired("reg.local/app:v1");
        d.path = Some(ctx.path().to_path_buf());
        d.archive_path = Some(out.path().join("app.tar"));
        d.repository = Some("reg.local/other:v2".to_string());
        d.push = true;
        d.dry_run = true;

        let result = reconcile(&store, sink(), d).await.unwrap();
        assert!(result.changed);
        assert!(store.mutating_calls().await.is_empty());
        assert!(!out.path().join("app.tar").exists());
    }

    #[tokio::test]
    async fn test_dry_run_force_push_reports_without_pushing() {
        let store = FakeImageStore::new();
        store.add_image(image("sha256:a", &["reg.local/app:latest"])).await;

        let mut d = desired("reg.local/app");
        d.force = true;
        d.try_to_pull = false;
        d.push = true;
        d.dry_run = true;

        let result = reconcile(&store, sink(), d).await.unwrap();
        assert_eq!(
            result.actions,
            vec![
                "Pulled image `reg.local/app:latest`",
                "Pushed image `reg.local/app` to `reg.local/app:latest`",
            ]
        );
        assert!(store.mutating_calls().await.is_empty());
        assert_eq!(result.image.map(|i| i.id), Some("sha256:a".to_string()));
    }
}
