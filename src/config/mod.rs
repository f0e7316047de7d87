//! TOML configuration.

mod loader;
mod types;

pub use loader::ConfigError;
pub use types::{CaptureConfig, Config, ExitGuardConfig, PowerLockConfig, SinkConfig};
