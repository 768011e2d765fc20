//! Load - config loading from file and environment variables.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::model::{ProgressOutput, ReconcilerConfig};

const DEFAULT_CONFIG_FILE: &str = "/etc/image-reconciler/config.toml";

impl ReconcilerConfig {
    /// Load configuration from file or environment variables
    /// Priority: Environment Variables > Config File > Defaults
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = std::env::var("RECONCILER_CONFIG_FILE")
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        let mut config = if Path::new(&config_path).exists() {
            tracing::info!("Loading configuration from: {}", config_path);
            Self::from_file(&config_path)?
        } else {
            tracing::info!("Config file not found at {}, using environment variables", config_path);
            Self::from_env()
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let config: ReconcilerConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from environment variables with sensible defaults.
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            docker_socket: std::env::var("DOCKER_SOCKET").unwrap_or(defaults.docker_socket),
            connect_timeout_secs: std::env::var("RECONCILER_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.connect_timeout_secs),
            desired_state_path: std::env::var("RECONCILER_DESIRED_STATE")
                .unwrap_or(defaults.desired_state_path),
            progress_output: std::env::var("RECONCILER_PROGRESS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.progress_output),
        }
    }

    /// Environment variables override file config. Here a malformed value is
    /// an error rather than silently ignored.
    fn apply_env_overrides(&mut self) -> Result<(), String> {
        if let Ok(socket) = std::env::var("DOCKER_SOCKET") {
            self.docker_socket = socket;
        }
        if let Ok(path) = std::env::var("RECONCILER_DESIRED_STATE") {
            self.desired_state_path = path;
        }
        if let Ok(progress) = std::env::var("RECONCILER_PROGRESS") {
            self.progress_output = progress.parse::<ProgressOutput>()?;
        }
        if let Ok(timeout) = std::env::var("RECONCILER_CONNECT_TIMEOUT") {
            self.connect_timeout_secs = timeout
                .parse()
                .map_err(|e| format!("RECONCILER_CONNECT_TIMEOUT: {}", e))?;
        }
        Ok(())
    }

    /// Validate that configuration values are sane
    pub fn validate(&self) -> Result<(), String> {
        if self.connect_timeout_secs == 0 {
            return Err("connect_timeout_secs must be > 0".to_string());
        }
        if self.desired_state_path.trim().is_empty() {
            return Err("desired_state_path must not be empty".to_string());
        }
        Ok(())
    }
}
