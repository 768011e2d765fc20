//! Shared Docker error → reconcile error mapping.
//!
//! Single source of truth for turning a [`DockerError`] raised by a build,
//! load or push into the fatal [`ReconcileError`] reported to the caller.

use std::path::Path;

use super::client::DockerError;
use crate::reconcile::error::ReconcileError;

/// Classify a push failure.
///
/// Mapping rules:
/// - text contains "unauthorized" and "authentication required" → log-in hint
/// - text contains "unauthorized" otherwise → "does the repository exist?" hint
/// - everything else → generic push failure
pub fn map_push_error(
    registry: &str,
    repo_name: &str,
    tag: &str,
    repository: &str,
    err: &DockerError,
) -> ReconcileError {
    let text = err.to_string();
    if text.contains("unauthorized") {
        if text.contains("authentication required") {
            return ReconcileError::PushAuthRequired {
                registry: registry.to_string(),
                repo_name: repo_name.to_string(),
                tag: tag.to_string(),
                error: text,
            };
        }
        return ReconcileError::PushUnauthorized {
            registry: registry.to_string(),
            repo_name: repo_name.to_string(),
            tag: tag.to_string(),
            error: text,
        };
    }
    ReconcileError::Push {
        repository: repository.to_string(),
        error: text,
    }
}

/// A build error keeps the daemon's code when the event carried one.
pub fn map_build_error(name: &str, err: DockerError, logs: Vec<String>) -> ReconcileError {
    match err {
        DockerError::Progress { code: Some(code), message } => ReconcileError::BuildDetail {
            name: name.to_string(),
            code: code.to_string(),
            message,
            logs,
        },
        other => ReconcileError::Build {
            name: name.to_string(),
            message: other.to_string(),
            logs,
        },
    }
}

/// Local I/O on the archive is an "opening" failure, anything the daemon
/// reports is a "loading" failure.
pub fn map_load_error(name: &str, load_path: &Path, err: DockerError) -> ReconcileError {
    match err {
        DockerError::Io(io) => ReconcileError::LoadOpen {
            load_path: load_path.to_path_buf(),
            error: io.to_string(),
        },
        other => ReconcileError::Load {
            name: name.to_string(),
            error: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(message: &str) -> DockerError {
        DockerError::Progress { code: None, message: message.to_string() }
    }

    #[test]
    fn test_push_auth_required() {
        let err = progress("unauthorized: authentication required");
        match map_push_error("reg.local", "team/app", "v1", "reg.local/team/app", &err) {
            ReconcileError::PushAuthRequired { registry, .. } => assert_eq!(registry, "reg.local"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_push_unauthorized_generic() {
        let err = progress("unauthorized: access to the requested resource is not authorized");
        let mapped = map_push_error("reg.local", "team/app", "v1", "reg.local/team/app", &err);
        assert!(matches!(mapped, ReconcileError::PushUnauthorized { .. }));
        assert!(mapped.to_string().contains("Does the repository exist?"));
    }

    #[test]
    fn test_push_other_error() {
        let err = progress("connection reset by peer");
        let mapped = map_push_error("reg.local", "team/app", "v1", "reg.local/team/app", &err);
        assert_eq!(
            mapped.to_string(),
            "Error pushing image reg.local/team/app: connection reset by peer"
        );
    }

    #[test]
    fn test_build_error_with_code() {
        let err = DockerError::Progress { code: Some(127), message: "not found".into() };
        let mapped = map_build_error("app", err, vec!["Step 1/1\n".into()]);
        match mapped {
            ReconcileError::BuildDetail { code, message, logs, .. } => {
                assert_eq!(code, "127");
                assert_eq!(message, "not found");
                assert_eq!(logs.len(), 1);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_build_error_without_code() {
        let mapped = map_build_error("app", progress("boom"), vec![]);
        assert_eq!(mapped.to_string(), "Error building app - message: boom, logs: []");
    }

    #[test]
    fn test_load_error_classification() {
        let io = DockerError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(matches!(
            map_load_error("app", Path::new("/tmp/app.tar"), io),
            ReconcileError::LoadOpen { .. }
        ));

        let daemon = progress("invalid tar header");
        assert_eq!(
            map_load_error("app", Path::new("/tmp/app.tar"), daemon).to_string(),
            "Error loading image app - invalid tar header"
        );
    }
}
