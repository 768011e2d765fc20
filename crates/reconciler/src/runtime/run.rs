//! Run - one reconciliation per process.

use std::path::Path;

use tracing::info;

use super::boot::progress_sink;
use crate::client::docker::ImageOps;
use crate::conf::ReconcilerConfig;
use crate::desired::DesiredState;
use crate::reconcile::{reconcile, ReconcileError, ReconcileFailure, ReconciliationResult};

/// Read the desired state named by `config` and reconcile it against `store`.
///
/// A desired-state file that cannot be read or parsed is reported like any
/// other failure, with an empty partial result.
pub async fn run_once(
    store: &dyn ImageOps,
    config: &ReconcilerConfig,
) -> Result<ReconciliationResult, ReconcileFailure> {
    let path = Path::new(&config.desired_state_path);
    info!("Reading desired state from: {}", path.display());

    let desired = DesiredState::from_file(path).map_err(|e| ReconcileFailure {
        error: ReconcileError::InvalidDesiredState(e.to_string()),
        partial: ReconciliationResult::default(),
    })?;

    reconcile(store, progress_sink(config.progress_output), desired).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::FakeImageStore;
    use crate::conf::ProgressOutput;
    use crate::docker::descriptor::ImageDescriptor;

    fn config_for(path: &Path) -> ReconcilerConfig {
        ReconcilerConfig {
            desired_state_path: path.display().to_string(),
            progress_output: ProgressOutput::None,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_run_once_reads_toml_desired_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.toml");
        std::fs::write(&path, "name = \"app\"\ntag = \"v1\"\n").unwrap();

        let store = FakeImageStore::new();
        store.add_image(ImageDescriptor::new("sha256:a", vec!["app:v1".into()])).await;

        let result = run_once(&store, &config_for(&path)).await.unwrap();
        assert!(!result.changed);
        assert_eq!(result.image.map(|i| i.id), Some("sha256:a".to_string()));
    }

    #[tokio::test]
    async fn test_run_once_reads_json_desired_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.json");
        std::fs::write(&path, r#"{"name": "app", "state": "absent"}"#).unwrap();

        let store = FakeImageStore::new();
        let result = run_once(&store, &config_for(&path)).await.unwrap();
        assert!(!result.changed);
        assert!(result.actions.is_empty());
    }

    #[tokio::test]
    async fn test_run_once_missing_file_is_failure() {
        let store = FakeImageStore::new();
        let failure = run_once(&store, &config_for(Path::new("/nonexistent/image.toml")))
            .await
            .unwrap_err();

        assert!(matches!(failure.error, ReconcileError::InvalidDesiredState(_)));
        let report = serde_json::to_value(failure.report()).unwrap();
        assert_eq!(report["failed"], true);
        assert_eq!(report["changed"], false);
        assert!(store.calls().await.is_empty());
    }
}
