use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::types::Config;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

impl Config {
    /// Returns the path to the configuration file.
    ///
    /// Uses `~/.config/taperec/config.toml` on Linux, or the platform
    /// equivalent via `dirs::config_dir()`. Falls back to the current
    /// directory if config_dir is unavailable.
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join("taperec").join("config.toml")
    }

    /// Loads configuration from the default config file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Loads configuration from `path`.
    ///
    /// - If the file doesn't exist, returns `Config::default()`.
    /// - If the file exists, parses it as TOML and validates.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// Checks:
    /// - The capture command names a program
    /// - The pipe queue holds at least one chunk
    /// - Power-lock backoff grows and starts above zero
    /// - `max_attempts`, when set, allows at least one attempt
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.command.first().map_or(true, |program| program.is_empty()) {
            return Err(ConfigError::ValidationError {
                message: "capture.command must name a program".to_string(),
            });
        }

        if self.capture.queue_depth == 0 {
            return Err(ConfigError::ValidationError {
                message: "capture.queue_depth must be at least 1".to_string(),
            });
        }

        let lock = &self.power_lock;
        if !lock.multiplier.is_finite() || lock.multiplier <= 1.0 {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "power_lock.multiplier must be a finite number greater than 1.0, got {}",
                    lock.multiplier
                ),
            });
        }

        if lock.initial_timeout_ms == 0 {
            return Err(ConfigError::ValidationError {
                message: "power_lock.initial_timeout_ms must be positive".to_string(),
            });
        }

        if lock.max_attempts == Some(0) {
            return Err(ConfigError::ValidationError {
                message: "power_lock.max_attempts must be at least 1".to_string(),
            });
        }

        if lock.enabled && lock.command.is_empty() {
            return Err(ConfigError::ValidationError {
                message: "power_lock.command is empty but the lock is enabled".to_string(),
            });
        }

        Ok(())
    }
}
