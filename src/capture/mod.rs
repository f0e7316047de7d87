//! Live capture resources.
//!
//! A capture produces a lazy, finite, non-restartable stream of binary
//! chunks. The stream ends after `stop()` (or when the underlying source
//! reaches EOF) once the last partial chunk has been delivered.

mod command;
mod sliced;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

pub use command::{CommandCapture, CommandCaptureProvider};
pub use sliced::SlicedCapture;

/// Errors surfaced through the chunk stream.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Capture read failed: {0}")]
    Read(#[from] std::io::Error),

    #[error("Capture device fault: {0}")]
    Fault(String),
}

pub type ChunkResult = Result<Bytes, CaptureError>;
pub type ChunkReceiver = mpsc::Receiver<ChunkResult>;

/// Recording state as seen by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Inactive,
    Recording,
    Paused,
}

/// Control surface of an acquired capture.
///
/// Commands are synchronous and only ever issued from the orchestrator's
/// transition step, so they are serialized by construction.
pub trait CaptureSource: Send + Sync {
    /// Begin recording; `slice` sets the chunking interval, `None` yields a
    /// single chunk on stop. Ignored unless inactive and never started.
    fn start(&self, slice: Option<Duration>);

    /// Pause; with `flush` the partial chunk is emitted first.
    fn pause(&self, flush: bool);

    fn resume(&self);

    /// End the recording. The chunk stream closes after the final chunk.
    /// Idempotent.
    fn stop(&self);

    /// Emit the partial chunk now without changing state.
    fn request_data(&self);

    fn state(&self) -> CaptureState;

    /// Take the chunk stream. Returns `None` after the first call.
    fn take_chunks(&self) -> Option<ChunkReceiver>;
}

pub type CaptureHandle = Arc<dyn CaptureSource>;

/// Parameters for acquiring a capture.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOptions {
    /// Program and arguments whose stdout is recorded.
    pub command: Vec<String>,
    pub slice: Option<Duration>,
    pub flush_on_pause: bool,
    pub start_immediately: bool,
    /// Chunks buffered between capture and sink before the capture stalls.
    pub queue_depth: usize,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            slice: Some(Duration::from_millis(1000)),
            flush_on_pause: true,
            start_immediately: true,
            queue_depth: 4,
        }
    }
}
