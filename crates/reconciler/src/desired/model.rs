//! Model - DesiredState and its build knobs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::name::{resolve_name_tag, DEFAULT_TAG};
use crate::docker::image::{BuildRequest, ContainerLimits};

/// Goal state for the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageState {
    Present,
    Absent,
    /// Deprecated spelling of `Present`.
    Build,
}

impl Default for ImageState {
    fn default() -> Self {
        ImageState::Present
    }
}

/// Options only used when the image is built from `path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    pub dockerfile: String,
    /// Remove intermediate containers after a build (also after failures).
    pub rm: bool,
    pub nocache: bool,
    /// Always attempt to pull a newer version of the base image.
    pub pull: bool,
    pub buildargs: HashMap<String, String>,
    pub container_limits: Option<ContainerLimits>,
    /// Seconds; passed through to the store for the build request.
    pub http_timeout: Option<u64>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            dockerfile: "Dockerfile".to_string(),
            rm: true,
            nocache: false,
            pull: true,
            buildargs: HashMap::new(),
            container_limits: None,
            http_timeout: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesiredState {
    pub name: String,
    pub tag: String,
    #[serde(alias = "build_path")]
    pub path: Option<PathBuf>,
    pub load_path: Option<PathBuf>,
    pub archive_path: Option<PathBuf>,
    pub repository: Option<String>,
    pub state: ImageState,
    pub force: bool,
    pub try_to_pull: bool,
    pub push: bool,
    /// Check mode: look things up, report what would change, mutate nothing.
    pub dry_run: bool,
    pub build: BuildOptions,
}

impl Default for DesiredState {
    fn default() -> Self {
        Self {
            name: String::new(),
            tag: DEFAULT_TAG.to_string(),
            path: None,
            load_path: None,
            archive_path: None,
            repository: None,
            state: ImageState::Present,
            force: false,
            try_to_pull: true,
            push: false,
            dry_run: false,
            build: BuildOptions::default(),
        }
    }
}

impl DesiredState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Apply the name/tag rule: a tag embedded in `name` overrides `tag`.
    pub fn normalized(mut self) -> Self {
        let (name, tag) = resolve_name_tag(&self.name, &self.tag);
        self.name = name;
        self.tag = tag;
        self
    }

    /// `name:tag`, or just `name` when the tag is empty.
    pub fn image_name(&self) -> String {
        if self.tag.is_empty() {
            self.name.clone()
        } else {
            format!("{}:{}", self.name, self.tag)
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self.state, ImageState::Present | ImageState::Build)
    }

    /// Checks that need no store access; run before any store call.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if self.path.is_some() && self.load_path.is_some() {
            return Err("parameters are mutually exclusive: path|load_path".to_string());
        }
        Ok(())
    }

    pub fn build_request(&self, context: &Path) -> BuildRequest {
        BuildRequest {
            context: context.to_path_buf(),
            tag: self.image_name(),
            dockerfile: self.build.dockerfile.clone(),
            rm: self.build.rm,
            nocache: self.build.nocache,
            pull: self.build.pull,
            buildargs: self.build.buildargs.clone(),
            container_limits: self.build.container_limits.clone(),
            http_timeout: self.build.http_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let d = DesiredState::default();
        assert_eq!(d.tag, "latest");
        assert_eq!(d.state, ImageState::Present);
        assert!(d.try_to_pull);
        assert!(!d.force);
        assert!(!d.push);
        assert!(!d.dry_run);
        assert_eq!(d.build.dockerfile, "Dockerfile");
        assert!(d.build.rm);
        assert!(d.build.pull);
        assert!(!d.build.nocache);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let d: DesiredState = toml::from_str(
            r#"
            name = "org/app"
            build_path = "./ctx"
            push = true

            [build]
            nocache = true
            buildargs = { VERSION = "1.2" }
            "#,
        )
        .expect("Should accept partial TOML");

        assert_eq!(d.name, "org/app");
        assert_eq!(d.tag, "latest");
        assert_eq!(d.path, Some(PathBuf::from("./ctx")));
        assert!(d.push);
        assert!(d.build.nocache);
        assert!(d.build.rm);
        assert_eq!(d.build.buildargs.get("VERSION").map(String::as_str), Some("1.2"));
    }

    #[test]
    fn test_json_state_values() {
        let d: DesiredState =
            serde_json::from_str(r#"{"name": "app", "state": "absent", "dry_run": true}"#).unwrap();
        assert_eq!(d.state, ImageState::Absent);
        assert!(d.dry_run);
        assert!(!d.is_present());

        let d: DesiredState = serde_json::from_str(r#"{"name": "app", "state": "build"}"#).unwrap();
        assert!(d.is_present());
    }

    #[test]
    fn test_normalized_embedded_tag_wins() {
        let mut d = DesiredState::new("x:v2");
        d.tag = "latest".to_string();
        let d = d.normalized();
        assert_eq!(d.name, "x");
        assert_eq!(d.tag, "v2");
        assert_eq!(d.image_name(), "x:v2");
    }

    #[test]
    fn test_validate_rejects_path_and_load_path() {
        let mut d = DesiredState::new("app");
        d.path = Some(PathBuf::from("ctx"));
        d.load_path = Some(PathBuf::from("app.tar"));
        let err = d.validate().unwrap_err();
        assert!(err.contains("mutually exclusive"), "got: {}", err);
    }

    #[test]
    fn test_validate_rejects_empty_name() {
        let d = DesiredState::new("  ");
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_build_request_carries_knobs() {
        let mut d = DesiredState::new("app");
        d.tag = "v1".to_string();
        d.build.http_timeout = Some(30);
        d.build.container_limits = Some(ContainerLimits {
            memory: Some(512),
            ..Default::default()
        });

        let req = d.build_request(Path::new("/ctx"));
        assert_eq!(req.tag, "app:v1");
        assert_eq!(req.context, PathBuf::from("/ctx"));
        assert_eq!(req.http_timeout, Some(30));
        assert_eq!(req.container_limits.and_then(|l| l.memory), Some(512));
    }
}
