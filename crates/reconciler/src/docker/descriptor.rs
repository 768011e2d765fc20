use std::collections::BTreeMap;

use bollard::models::ImageInspect;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Image metadata handed back to callers.
///
/// Only `Id` participates in identity; see [`ImageDescriptor::same_image`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "RepoTags", default)]
    pub repo_tags: Vec<String>,
    #[serde(rename = "Created", default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(rename = "Metadata", default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Set to "Deleted" once the absent reconciler removed the image.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub state: Option<String>,
    /// Last status line reported by the daemon while pushing.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub push_status: Option<String>,
}

impl ImageDescriptor {
    pub fn new(id: impl Into<String>, repo_tags: Vec<String>) -> Self {
        Self {
            id: id.into(),
            repo_tags,
            ..Default::default()
        }
    }

    /// Two descriptors denote the same image iff their ids match.
    pub fn same_image(&self, other: &ImageDescriptor) -> bool {
        !self.id.is_empty() && self.id == other.id
    }

    pub fn has_tag(&self, name_tag: &str) -> bool {
        self.repo_tags.iter().any(|t| t == name_tag)
    }

    pub fn mark_deleted(mut self) -> Self {
        self.state = Some("Deleted".to_string());
        self
    }
}

impl From<ImageInspect> for ImageDescriptor {
    fn from(inspect: ImageInspect) -> Self {
        // Go through the serde form: bollard renames these to the daemon's
        // PascalCase keys and the concrete field types shift between releases.
        let value = serde_json::to_value(&inspect).unwrap_or(serde_json::Value::Null);

        let id = value
            .get("Id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let repo_tags = value
            .get("RepoTags")
            .and_then(|v| v.as_array())
            .map(|tags| {
                tags.iter()
                    .filter_map(|t| t.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        // "Created" is RFC3339 with nanoseconds, e.g. 2024-01-02T03:04:05.123456789Z
        let created = value
            .get("Created")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let metadata = value
            .get("Metadata")
            .and_then(|v| v.as_object())
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        Self {
            id,
            repo_tags,
            created,
            metadata,
            state: None,
            push_status: None,
        }
    }
}
