//! Persistent output sinks.

mod file;
mod naming;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub use file::{FileSink, FileSinkProvider};
pub use naming::{filename_safe_timestamp, zone_letter};

#[derive(Debug, Error)]
pub enum SinkError {
    /// Writing to or closing a sink that is already closed or aborted.
    #[error("Sink already closed")]
    Closed,

    #[error("Sink I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Write side of the session's output.
#[async_trait]
pub trait ChunkSink: Send + Sync {
    /// Accept one chunk. Resolves once the sink can take the next one.
    async fn write(&self, chunk: Bytes) -> Result<(), SinkError>;

    /// Flush and close. A second close yields [`SinkError::Closed`].
    async fn close(&self) -> Result<(), SinkError>;

    /// Drop buffered data and close without flushing.
    async fn abort(&self, reason: &str) -> Result<(), SinkError>;
}

pub type SinkHandle = Arc<dyn ChunkSink>;

/// Parameters for acquiring a sink.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkOptions {
    pub output_dir: PathBuf,
    /// Used verbatim as the file name when present.
    pub suggested_name: Option<String>,
    pub prefix: String,
    pub extension: String,
    /// Timestamp file names in local time (with zone letter) or UTC.
    pub local_time: bool,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            suggested_name: None,
            prefix: "recording-".to_string(),
            extension: "wav".to_string(),
            local_time: true,
        }
    }
}

impl SinkOptions {
    /// File name for a recording started at `now`.
    ///
    /// Only the final component of a suggested name is kept, so the file
    /// always lands directly inside `output_dir`.
    pub fn file_name(&self, now: chrono::DateTime<chrono::Local>) -> String {
        let suggested = self
            .suggested_name
            .as_deref()
            .and_then(|name| Path::new(name.trim()).file_name())
            .map(|name| name.to_string_lossy().trim().to_string())
            .filter(|name| !name.is_empty());
        match suggested {
            Some(name) => name,
            None => format!(
                "{}{}.{}",
                self.prefix,
                filename_safe_timestamp(&now, self.local_time),
                self.extension
            ),
        }
    }
}
