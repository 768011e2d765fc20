//! Result - what a reconciliation run changed and did.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::docker::descriptor::ImageDescriptor;

/// Accumulated outcome of one run. `actions` and `warnings` are append-only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub changed: bool,
    pub actions: Vec<String>,
    pub warnings: Vec<String>,
    /// The most relevant image; serialized as `{}` when there is none.
    #[serde(with = "image_or_empty")]
    pub image: Option<ImageDescriptor>,
}

impl ReconciliationResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a human-readable action and log it.
    pub fn append_action(&mut self, action: impl Into<String>) {
        let action = action.into();
        info!(action = %action, "Action");
        self.actions.push(action);
    }

    /// Record a warning. Warnings never affect `changed` or control flow.
    pub fn warn(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        warn!(warning = %warning, "Warning");
        self.warnings.push(warning);
    }

    pub fn mark_changed(&mut self) {
        self.changed = true;
    }

    pub fn set_image(&mut self, image: Option<ImageDescriptor>) {
        self.image = image;
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }
}

mod image_or_empty {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::docker::descriptor::ImageDescriptor;

    pub fn serialize<S: Serializer>(
        image: &Option<ImageDescriptor>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match image {
            Some(image) => image.serialize(serializer),
            None => serde_json::Map::new().serialize(serializer),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<ImageDescriptor>, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::Object(ref map) if map.is_empty() => Ok(None),
            serde_json::Value::Null => Ok(None),
            other => serde_json::from_value(other)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
