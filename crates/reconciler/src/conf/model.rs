//! Model - ReconcilerConfig and related types.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Empty means bollard's defaults (`DOCKER_HOST` or the local socket).
    pub docker_socket: String,
    pub connect_timeout_secs: u64,
    pub desired_state_path: String,
    pub progress_output: ProgressOutput,
}

/// Where daemon progress (build logs, pull/push status) is relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressOutput {
    /// Rendered lines on stderr.
    Console,
    Log,
    None,
}

impl Default for ProgressOutput {
    fn default() -> Self {
        ProgressOutput::Log
    }
}

impl FromStr for ProgressOutput {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "console" => Ok(ProgressOutput::Console),
            "log" => Ok(ProgressOutput::Log),
            "none" => Ok(ProgressOutput::None),
            other => Err(format!("unknown progress output: {}", other)),
        }
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            docker_socket: "".to_string(),
            connect_timeout_secs: 120,
            desired_state_path: "image.toml".to_string(),
            progress_output: ProgressOutput::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── ReconcilerConfig Defaults ────────────────────────────────

    #[test]
    fn test_config_default_docker_socket_empty() {
        let cfg = ReconcilerConfig::default();
        assert!(cfg.docker_socket.is_empty(), "Default docker_socket should be empty (use system default)");
    }

    #[test]
    fn test_config_default_timeout() {
        let cfg = ReconcilerConfig::default();
        assert_eq!(cfg.connect_timeout_secs, 120);
    }

    #[test]
    fn test_config_default_desired_state_path() {
        let cfg = ReconcilerConfig::default();
        assert_eq!(cfg.desired_state_path, "image.toml");
    }

    #[test]
    fn test_config_default_progress_output() {
        let cfg = ReconcilerConfig::default();
        assert_eq!(cfg.progress_output, ProgressOutput::Log);
    }

    // ── ProgressOutput Parsing ───────────────────────────────────

    #[test]
    fn test_progress_output_from_str() {
        assert_eq!("console".parse::<ProgressOutput>(), Ok(ProgressOutput::Console));
        assert!("stdout".parse::<ProgressOutput>().is_err());
        assert_eq!(" LOG ".parse::<ProgressOutput>(), Ok(ProgressOutput::Log));
        assert_eq!("none".parse::<ProgressOutput>(), Ok(ProgressOutput::None));
        let err = "syslog".parse::<ProgressOutput>().unwrap_err();
        assert!(err.contains("syslog"), "Error should name the bad value: {}", err);
    }

    // ── Serialization ────────────────────────────────────────────

    #[test]
    fn test_config_deserialize_partial_toml() {
        // Only set progress_output; rest should use defaults via #[serde(default)]
        let toml_str = r#"progress_output = "console""#;
        let cfg: ReconcilerConfig = toml::from_str(toml_str).expect("Should accept partial TOML");
        assert_eq!(cfg.progress_output, ProgressOutput::Console);
        assert_eq!(cfg.connect_timeout_secs, 120); // default
        assert_eq!(cfg.desired_state_path, "image.toml"); // default
    }

    #[test]
    fn test_config_rejects_unknown_progress_output() {
        let toml_str = r#"progress_output = "syslog""#;
        assert!(toml::from_str::<ReconcilerConfig>(toml_str).is_err());
    }

    #[test]
    fn test_config_toml_round_trip() {
        let cfg = ReconcilerConfig {
            docker_socket: "unix:///var/run/docker.sock".to_string(),
            progress_output: ProgressOutput::None,
            ..Default::default()
        };
        let toml_str = toml::to_string(&cfg).expect("Should serialize to TOML");
        let deserialized: ReconcilerConfig = toml::from_str(&toml_str).expect("Should deserialize from TOML");
        assert_eq!(deserialized.docker_socket, cfg.docker_socket);
        assert_eq!(deserialized.progress_output, ProgressOutput::None);
    }
}
