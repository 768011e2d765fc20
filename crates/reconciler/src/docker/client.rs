//! Docker client - core struct, constructor, error types.
//!
//! Image operations live in the sibling `image` module which adds an
//! `impl DockerClient` block.

use bollard::Docker;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DockerError {
    #[error("Docker connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Image not found: {0}")]
    ImageNotFound(String),
    #[error("Registry returned more than one result for {0}")]
    AmbiguousImage(String),
    /// An error event reported inside a progress stream (build, pull, load, push).
    #[error("{message}")]
    Progress {
        code: Option<i64>,
        message: String,
    },
    #[error("Tag operation failed.")]
    TagRejected,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Bollard error: {0}")]
    BollardError(#[from] bollard::errors::Error),
}

#[derive(Debug, Clone)]
pub struct DockerClient {
    /// The bollard Docker client.  `pub(super)` so that the image module
    /// can call bollard APIs directly.
    pub(super) client: Docker,
    /// The Docker socket path this client is connected to.
    pub(super) socket_path: String,
}

impl DockerClient {
    pub fn new(socket_path: &str, timeout_secs: u64) -> Result<Self, DockerError> {
        let connection = if socket_path.is_empty() {
            Docker::connect_with_defaults()
                .map_err(|e| DockerError::ConnectionFailed(e.to_string()))?
        } else {
            let clean_path = socket_path.trim_start_matches("unix://");
            Docker::connect_with_socket(clean_path, timeout_secs, &bollard::API_DEFAULT_VERSION)
                .map_err(|e| DockerError::ConnectionFailed(e.to_string()))?
        };

        Ok(DockerClient {
            client: connection,
            socket_path: socket_path.to_string(),
        })
    }

    /// The socket this client talks to ("" means bollard's defaults).
    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }

    /// Check that the daemon answers before a reconciliation starts.
    pub async fn ping(&self) -> Result<(), DockerError> {
        self.client
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| DockerError::ConnectionFailed(e.to_string()))
    }
}
