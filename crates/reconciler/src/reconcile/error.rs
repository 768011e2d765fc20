//! Error - fatal reconciliation failures.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use super::result::ReconciliationResult;
use crate::docker::client::DockerError;

/// A failure that aborts the run. Each variant carries the values that were
/// interpolated into its message; see [`ReconcileError::values`].
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Invalid desired state: {0}")]
    InvalidDesiredState(String),

    #[error("Requested build path `{}` could not be found or you do not have access.", .path.display())]
    BuildPathMissing { path: PathBuf },

    #[error("Error loading image `{name}`. Specified load path `{}` does not exist.", .load_path.display())]
    LoadPathMissing { name: String, load_path: PathBuf },

    #[error("Error building {name} - code: {code}, message: {message}, logs: {logs:?}")]
    BuildDetail {
        name: String,
        code: String,
        message: String,
        logs: Vec<String>,
    },

    #[error("Error building {name} - message: {message}, logs: {logs:?}")]
    Build {
        name: String,
        message: String,
        logs: Vec<String>,
    },

    #[error("Error opening image `{}` - `{error}`", .load_path.display())]
    LoadOpen { load_path: PathBuf, error: String },

    #[error("Error loading image {name} - {error}")]
    Load { name: String, error: String },

    #[error("Error pulling {name} - {error}")]
    Pull { name: String, error: String },

    #[error("Error getting image `{image}` - {error}")]
    ArchiveRead { image: String, error: String },

    #[error("Error writing image archive `{}` - {error}", .archive_path.display())]
    ArchiveWrite { archive_path: PathBuf, error: String },

    #[error("Error: failed to tag image - {error}")]
    Tag { error: String },

    #[error("Error pushing image {registry}/{repo_name}:{tag} - {error}. Try logging into {registry} first.")]
    PushAuthRequired {
        registry: String,
        repo_name: String,
        tag: String,
        error: String,
    },

    #[error("Error pushing image {registry}/{repo_name}:{tag} - {error}. Does the repository exist?")]
    PushUnauthorized {
        registry: String,
        repo_name: String,
        tag: String,
        error: String,
    },

    #[error("Error pushing image {repository}: {error}")]
    Push { repository: String, error: String },

    #[error("Error removing image {name} - {error}")]
    Remove { name: String, error: String },

    #[error("Error looking up image: {0}")]
    Lookup(#[from] DockerError),
}

impl ReconcileError {
    /// The context values interpolated into the message.
    pub fn values(&self) -> BTreeMap<&'static str, String> {
        let mut values = BTreeMap::new();
        let mut put = |k: &'static str, v: String| {
            values.insert(k, v);
        };
        match self {
            Self::InvalidDesiredState(reason) => put("reason", reason.clone()),
            Self::BuildPathMissing { path } => put("path", path.display().to_string()),
            Self::LoadPathMissing { name, load_path } => {
                put("name", name.clone());
                put("load_path", load_path.display().to_string());
            }
            Self::BuildDetail { name, code, message, logs } => {
                put("name", name.clone());
                put("code", code.clone());
                put("message", message.clone());
                put("logs", logs.concat());
            }
            Self::Build { name, message, logs } => {
                put("name", name.clone());
                put("message", message.clone());
                put("logs", logs.concat());
            }
            Self::LoadOpen { load_path, error } => {
                put("load_path", load_path.display().to_string());
                put("error", error.clone());
            }
            Self::Load { name, error } | Self::Pull { name, error } | Self::Remove { name, error } => {
                put("name", name.clone());
                put("error", error.clone());
            }
            Self::ArchiveRead { image, error } => {
                put("image", image.clone());
                put("error", error.clone());
            }
            Self::ArchiveWrite { archive_path, error } => {
                put("archive_path", archive_path.display().to_string());
                put("error", error.clone());
            }
            Self::Tag { error } => put("error", error.clone()),
            Self::PushAuthRequired { registry, repo_name, tag, error }
            | Self::PushUnauthorized { registry, repo_name, tag, error } => {
                put("registry", registry.clone());
                put("repo_name", repo_name.clone());
                put("tag", tag.clone());
                put("error", error.clone());
            }
            Self::Push { repository, error } => {
                put("repository", repository.clone());
                put("error", error.clone());
            }
            Self::Lookup(err) => put("error", err.to_string()),
        }
        values
    }
}

/// A fatal error together with everything recorded before it happened.
#[derive(Debug)]
pub struct ReconcileFailure {
    pub error: ReconcileError,
    pub partial: ReconciliationResult,
}

impl std::fmt::Display for ReconcileFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for ReconcileFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Wire form of a failed run.
#[derive(Debug, Serialize)]
pub struct FailureReport<'a> {
    pub failed: bool,
    pub msg: String,
    pub values: BTreeMap<&'static str, String>,
    pub changed: bool,
    pub actions: &'a [String],
    pub warnings: &'a [String],
}

impl ReconcileFailure {
    pub fn report(&self) -> FailureReport<'_> {
        FailureReport {
            failed: true,
            msg: self.error.to_string(),
            values: self.error.values(),
            changed: self.partial.changed,
            actions: &self.partial.actions,
            warnings: &self.partial.warnings,
        }
    }
}
