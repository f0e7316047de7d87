//! Transfer pipe: copies capture chunks into the sink.
//!
//! One chunk is in flight at a time; the next is only pulled from the
//! capture's bounded queue after the sink accepted the previous one, so a
//! slow sink stalls the capture rather than growing a buffer.

use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::capture::{CaptureError, ChunkReceiver};
use crate::resource::ActorId;
use crate::sink::{SinkError, SinkHandle};

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Capture failed mid-stream: {0}")]
    Capture(#[from] CaptureError),

    #[error("Sink rejected chunk: {0}")]
    Sink(#[from] SinkError),

    #[error("Capture stream already taken")]
    SourceUnavailable,

    #[error("Transfer aborted")]
    Aborted,
}

/// Terminal report of a pipe that ran to an end on its own.
#[derive(Debug)]
pub enum PipeReport {
    Done { id: ActorId },
    Error { id: ActorId, cause: TransferError },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeEnd {
    /// Source ended and the sink was closed.
    Completed,
    /// Source or sink failed.
    Failed,
    /// Stopped by teardown between chunks.
    Stopped,
    /// Aborted by teardown while a write was in flight.
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeOutcome {
    pub end: PipeEnd,
    pub chunks: u64,
    pub bytes: u64,
}

pub struct TransferPipe;

impl TransferPipe {
    /// Start copying. `report` fires once if the pipe completes or fails on
    /// its own, and not at all if teardown stops it.
    pub fn spawn<F>(id: ActorId, source: ChunkReceiver, sink: SinkHandle, report: F) -> PipeHandle
    where
        F: FnOnce(PipeReport) + Send + 'static,
    {
        let stop = CancellationToken::new();
        let abort = CancellationToken::new();
        let task = tokio::spawn(run(
            id,
            source,
            sink.clone(),
            stop.clone(),
            abort.clone(),
            report,
        ));

        PipeHandle {
            id,
            sink,
            stop,
            abort,
            task,
        }
    }
}

async fn run<F>(
    id: ActorId,
    mut source: ChunkReceiver,
    sink: SinkHandle,
    stop: CancellationToken,
    abort: CancellationToken,
    report: F,
) -> PipeOutcome
where
    F: FnOnce(PipeReport),
{
    let mut chunks = 0u64;
    let mut bytes = 0u64;

    let result: Result<(), TransferError> = loop {
        let next = tokio::select! {
            biased;
            _ = stop.cancelled() => {
                tracing::debug!(%id, chunks, bytes, "Pipe stopped");
                return PipeOutcome { end: PipeEnd::Stopped, chunks, bytes };
            }
            next = source.recv() => next,
        };

        let chunk = match next {
            None => break Ok(()),
            Some(Err(err)) => break Err(err.into()),
            Some(Ok(chunk)) => chunk,
        };

        let len = chunk.len() as u64;
        tokio::select! {
            biased;
            _ = abort.cancelled() => {
                tracing::warn!(%id, chunks, bytes, "Pipe aborted mid-write");
                return PipeOutcome { end: PipeEnd::Aborted, chunks, bytes };
            }
            written = sink.write(chunk) => {
                if let Err(err) = written {
                    break Err(err.into());
                }
            }
        }
        chunks += 1;
        bytes += len;
        tracing::trace!(%id, chunks, bytes, "Chunk written");
    };

    // Source ended: close the sink; on failure, abort it.
    let result = match result {
        Ok(()) => sink.close().await.map_err(TransferError::from),
        Err(err) => {
            drop(source);
            if let Err(abort_err) = sink.abort(&err.to_string()).await {
                tracing::debug!(%id, error = %abort_err, "Sink abort after failure");
            }
            Err(err)
        }
    };

    match result {
        Ok(()) => {
            tracing::info!(%id, chunks, bytes, "Transfer complete");
            report(PipeReport::Done { id });
            PipeOutcome { end: PipeEnd::Completed, chunks, bytes }
        }
        Err(cause) => {
            tracing::debug!(%id, error = %cause, "Transfer failed");
            report(PipeReport::Error { id, cause });
            PipeOutcome { end: PipeEnd::Failed, chunks, bytes }
        }
    }
}

/// Owner-side handle of a running pipe.
pub struct PipeHandle {
    id: ActorId,
    sink: SinkHandle,
    stop: CancellationToken,
    abort: CancellationToken,
    task: JoinHandle<PipeOutcome>,
}

impl PipeHandle {
    pub fn id(&self) -> ActorId {
        self.id
    }

    /// Stop between chunks and wait up to `grace` for an in-flight write;
    /// past that, abort the write and the sink.
    pub async fn shutdown(mut self, grace: Duration) -> PipeOutcome {
        self.stop.cancel();
        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(joined) => self.joined(joined),
            Err(_) => {
                tracing::warn!(id = %self.id, ?grace, "Sink still writing after grace period, aborting");
                self.abort.cancel();
                if let Err(err) = self.sink.abort("disposed while still writing").await {
                    tracing::debug!(id = %self.id, error = %err, "Sink abort during teardown");
                }
                let joined = (&mut self.task).await;
                self.joined(joined)
            }
        }
    }

    fn joined(&self, joined: Result<PipeOutcome, tokio::task::JoinError>) -> PipeOutcome {
        joined.unwrap_or_else(|err| {
            tracing::warn!(id = %self.id, error = %err, "Pipe task failed");
            PipeOutcome {
                end: PipeEnd::Failed,
                chunks: 0,
                bytes: 0,
            }
        })
    }
}
