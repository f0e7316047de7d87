use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capture::CaptureOptions;
use crate::power::LockKind;
use crate::retry::{RetryPolicy, GOLDEN_RATIO};
use crate::sink::SinkOptions;

/// Root configuration container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub power_lock: PowerLockConfig,
    #[serde(default)]
    pub exit_guard: ExitGuardConfig,
}

/// Capture program and chunking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Program and arguments whose stdout is recorded.
    #[serde(default = "default_capture_command")]
    pub command: Vec<String>,
    /// Chunk interval in milliseconds; 0 yields a single chunk on stop.
    #[serde(default = "default_slice_ms")]
    pub slice_ms: u64,
    #[serde(default = "default_true")]
    pub flush_on_pause: bool,
    #[serde(default = "default_true")]
    pub start_immediately: bool,
    /// Chunks buffered between capture and sink.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

/// Output file placement and naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_extension")]
    pub extension: String,
    /// How long teardown lets an in-flight write finish (default: 1000).
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
    /// Stamp file names with local time and zone letter instead of UTC.
    #[serde(default = "default_true")]
    pub local_time: bool,
}

/// Idle/sleep inhibition while recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerLockConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub kind: LockKind,
    /// Inhibitor program; `--what=<kind>` is inserted after the program.
    #[serde(default = "default_inhibit_command")]
    pub command: Vec<String>,
    /// Attempts before giving up. Unbounded when absent.
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default = "default_initial_timeout_ms")]
    pub initial_timeout_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitGuardConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Block exit attempts while recording.
    #[serde(default = "default_true")]
    pub block_exit: bool,
}

fn default_true() -> bool {
    true
}

fn default_capture_command() -> Vec<String> {
    ["arecord", "-q", "-f", "cd", "-t", "wav"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_slice_ms() -> u64 {
    1000
}

fn default_queue_depth() -> usize {
    4
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_prefix() -> String {
    "recording-".to_string()
}

fn default_extension() -> String {
    "wav".to_string()
}

fn default_grace_ms() -> u64 {
    1000
}

fn default_inhibit_command() -> Vec<String> {
    [
        "systemd-inhibit",
        "--who=taperec",
        "--why=Recording in progress",
        "sleep",
        "infinity",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_initial_timeout_ms() -> u64 {
    1000
}

fn default_multiplier() -> f64 {
    GOLDEN_RATIO
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            command: default_capture_command(),
            slice_ms: default_slice_ms(),
            flush_on_pause: true,
            start_immediately: true,
            queue_depth: default_queue_depth(),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            prefix: default_prefix(),
            extension: default_extension(),
            grace_ms: default_grace_ms(),
            local_time: true,
        }
    }
}

impl Default for PowerLockConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            kind: LockKind::default(),
            command: default_inhibit_command(),
            max_attempts: None,
            initial_timeout_ms: default_initial_timeout_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl Default for ExitGuardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            block_exit: true,
        }
    }
}

impl CaptureConfig {
    pub fn slice(&self) -> Option<Duration> {
        (self.slice_ms > 0).then(|| Duration::from_millis(self.slice_ms))
    }

    pub fn options(&self) -> CaptureOptions {
        CaptureOptions {
            command: self.command.clone(),
            slice: self.slice(),
            flush_on_pause: self.flush_on_pause,
            start_immediately: self.start_immediately,
            queue_depth: self.queue_depth,
        }
    }
}

impl SinkConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    /// Options for one recording, optionally with a caller-chosen file name.
    pub fn options(&self, suggested_name: Option<String>) -> SinkOptions {
        SinkOptions {
            output_dir: self.output_dir.clone(),
            suggested_name,
            prefix: self.prefix.clone(),
            extension: self.extension.clone(),
            local_time: self.local_time,
        }
    }
}

impl PowerLockConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_timeout: Duration::from_millis(self.initial_timeout_ms),
            multiplier: self.multiplier,
        }
    }
}
