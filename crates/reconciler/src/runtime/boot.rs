//! Boot - logging init, config load, Docker connection.

use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::conf::{ProgressOutput, ReconcilerConfig};
use crate::docker::client::DockerClient;
use crate::docker::stream::{ConsoleSink, NullSink, ProgressSink, TracingSink};

/// Initialise the tracing / logging subsystem.
///
/// Logs go to stderr; stdout carries the JSON result.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "image_reconciler=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Load config, apply the command-line desired-state path if given, and
/// connect to Docker.
///
/// Returns `(DockerClient, ReconcilerConfig)` on success.
pub async fn boot(
    desired_state_override: Option<String>,
) -> Result<(DockerClient, ReconcilerConfig), Box<dyn std::error::Error>> {
    info!("Starting image-reconciler v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration (file or env)
    let mut config = ReconcilerConfig::load()?;
    if let Some(path) = desired_state_override {
        config.desired_state_path = path;
    }
    config.validate()?;
    info!(
        "Loaded configuration: desired_state_path={}, progress_output={:?}",
        config.desired_state_path, config.progress_output
    );

    info!(
        "Connecting to Docker daemon at: {}",
        if config.docker_socket.is_empty() {
            "default socket"
        } else {
            &config.docker_socket
        }
    );

    let docker_client = DockerClient::new(&config.docker_socket, config.connect_timeout_secs)
        .map_err(|e| {
            error!("Failed to connect to Docker: {}", e);
            e
        })?;
    docker_client.ping().await.map_err(|e| {
        error!("Docker daemon did not answer: {}", e);
        e
    })?;

    info!(
        "Successfully connected to Docker daemon ({})",
        if docker_client.socket_path().is_empty() {
            "default socket"
        } else {
            docker_client.socket_path()
        }
    );
    Ok((docker_client, config))
}

/// The sink daemon progress is relayed to.
pub fn progress_sink(output: ProgressOutput) -> Arc<dyn ProgressSink> {
    match output {
        ProgressOutput::Console => Arc::new(ConsoleSink::stderr()),
        ProgressOutput::Log => Arc::new(TracingSink),
        ProgressOutput::None => Arc::new(NullSink),
    }
}
