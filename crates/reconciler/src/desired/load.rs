//! Load - reading a DesiredState from a TOML or JSON file.

use std::path::Path;

use super::model::DesiredState;

impl DesiredState {
    /// Read a desired-state file. `.json` files are parsed as JSON,
    /// everything else as TOML.
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read desired state {}: {}", path.display(), e))?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let parsed: Result<DesiredState, String> = if is_json {
            serde_json::from_str(&contents).map_err(|e| e.to_string())
        } else {
            toml::from_str(&contents).map_err(|e| e.to_string())
        };
        let desired =
            parsed.map_err(|e| format!("Invalid desired state {}: {}", path.display(), e))?;
        tracing::debug!(path = %path.display(), name = %desired.name, "Loaded desired state");
        Ok(desired)
    }
}
