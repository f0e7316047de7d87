use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use crate::resource::{AcquireError, ReleaseError, Resource, ResourceKind};

use super::sliced::SlicedCapture;
use super::{CaptureHandle, CaptureOptions, CaptureSource, CaptureState, ChunkReceiver};

/// Capture fed by the stdout of a child process (e.g. `arecord`).
///
/// The session owns the child: stopping the capture also kills it.
pub struct CommandCapture {
    engine: SlicedCapture,
    child: Mutex<Option<Child>>,
}

impl CommandCapture {
    pub fn spawn(command: &[String], queue_depth: usize) -> Result<Self, AcquireError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| AcquireError::Unavailable("empty capture command".to_string()))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take().ok_or_else(|| {
            AcquireError::Unavailable(format!("'{}' has no stdout", program))
        })?;

        tracing::info!(program = %program, pid = ?child.id(), "Capture process started");
        Ok(Self {
            engine: SlicedCapture::new(stdout, queue_depth),
            child: Mutex::new(Some(child)),
        })
    }

    fn kill_child(&self) {
        if let Some(mut child) = self.child.lock().take() {
            if let Err(err) = child.start_kill() {
                tracing::debug!(error = %err, "Capture process already gone");
            }
        }
    }
}

impl CaptureSource for CommandCapture {
    fn start(&self, slice: Option<Duration>) {
        self.engine.start(slice);
    }

    fn pause(&self, flush: bool) {
        self.engine.pause(flush);
    }

    fn resume(&self) {
        self.engine.resume();
    }

    fn stop(&self) {
        self.engine.stop();
        self.kill_child();
    }

    fn request_data(&self) {
        self.engine.request_data();
    }

    fn state(&self) -> CaptureState {
        self.engine.state()
    }

    fn take_chunks(&self) -> Option<ChunkReceiver> {
        self.engine.take_chunks()
    }
}

/// Acquires a [`CommandCapture`] per session.
#[derive(Debug, Default)]
pub struct CommandCaptureProvider;

#[async_trait]
impl Resource for CommandCaptureProvider {
    type Input = CaptureOptions;
    type Handle = CaptureHandle;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Capture
    }

    async fn acquire(
        &self,
        options: CaptureOptions,
        cancel: CancellationToken,
    ) -> Result<CaptureHandle, AcquireError> {
        if cancel.is_cancelled() {
            return Err(AcquireError::Cancelled);
        }

        let capture = CommandCapture::spawn(&options.command, options.queue_depth)?;
        if options.start_immediately {
            capture.start(options.slice);
        }
        Ok(Arc::new(capture))
    }

    async fn release(&self, capture: CaptureHandle) -> Result<(), ReleaseError> {
        capture.stop();
        Ok(())
    }
}
