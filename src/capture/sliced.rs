use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::{CaptureError, CaptureSource, CaptureState, ChunkReceiver, ChunkResult};

const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug)]
enum Command {
    Start(Option<Duration>),
    Pause { flush: bool },
    Resume,
    RequestData,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Recording,
    Paused,
    Stopped,
}

impl Phase {
    fn state(self) -> CaptureState {
        match self {
            Phase::Idle | Phase::Stopped => CaptureState::Inactive,
            Phase::Recording => CaptureState::Recording,
            Phase::Paused => CaptureState::Paused,
        }
    }
}

/// Capture engine over any byte source.
///
/// Nothing is read before `start()`. Bytes read while paused are dropped.
/// Chunks go out on every slice tick, on flush requests, and once more on
/// stop or EOF; then the stream ends. Sending a chunk waits for room in the
/// bounded queue, which stalls reading until the consumer catches up.
pub struct SlicedCapture {
    phase: Arc<Mutex<Phase>>,
    commands: mpsc::UnboundedSender<Command>,
    chunks: Mutex<Option<ChunkReceiver>>,
}

impl SlicedCapture {
    pub fn new<R>(reader: R, queue_depth: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let phase = Arc::new(Mutex::new(Phase::Idle));
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (chunk_tx, chunk_rx) = mpsc::channel(queue_depth.max(1));

        tokio::spawn(run(reader, command_rx, chunk_tx, Arc::clone(&phase)));

        Self {
            phase,
            commands,
            chunks: Mutex::new(Some(chunk_rx)),
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::trace!("Capture engine already finished");
        }
    }
}

impl CaptureSource for SlicedCapture {
    fn start(&self, slice: Option<Duration>) {
        let mut phase = self.phase.lock();
        if *phase != Phase::Idle {
            tracing::debug!(phase = ?*phase, "Capture already started");
            return;
        }
        *phase = Phase::Recording;
        self.send(Command::Start(slice));
    }

    fn pause(&self, flush: bool) {
        let mut phase = self.phase.lock();
        if *phase == Phase::Recording {
            *phase = Phase::Paused;
            self.send(Command::Pause { flush });
        }
    }

    fn resume(&self) {
        let mut phase = self.phase.lock();
        if *phase == Phase::Paused {
            *phase = Phase::Recording;
            self.send(Command::Resume);
        }
    }

    fn stop(&self) {
        let mut phase = self.phase.lock();
        if *phase != Phase::Stopped {
            *phase = Phase::Stopped;
            self.send(Command::Stop);
        }
    }

    fn request_data(&self) {
        let phase = self.phase.lock();
        if matches!(*phase, Phase::Recording | Phase::Paused) {
            self.send(Command::RequestData);
        }
    }

    fn state(&self) -> CaptureState {
        self.phase.lock().state()
    }

    fn take_chunks(&self) -> Option<ChunkReceiver> {
        self.chunks.lock().take()
    }
}

async fn run<R>(
    mut reader: R,
    mut commands: mpsc::UnboundedReceiver<Command>,
    chunks: mpsc::Sender<ChunkResult>,
    phase: Arc<Mutex<Phase>>,
) where
    R: AsyncRead + Unpin,
{
    let mut pending = BytesMut::new();
    let mut incoming = BytesMut::with_capacity(READ_CHUNK);
    let mut started = false;
    let mut recording = false;
    let mut ticker: Option<Interval> = None;

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Start(slice)) => {
                    started = true;
                    recording = true;
                    ticker = slice.map(slice_interval);
                    tracing::debug!(?slice, "Capture started");
                }
                Some(Command::Pause { flush }) => {
                    recording = false;
                    if flush && !emit(&chunks, &mut pending).await {
                        break;
                    }
                    tracing::debug!(flush, "Capture paused");
                }
                Some(Command::Resume) => {
                    recording = true;
                    tracing::debug!("Capture resumed");
                }
                Some(Command::RequestData) => {
                    if !emit(&chunks, &mut pending).await {
                        break;
                    }
                }
                Some(Command::Stop) | None => {
                    tracing::debug!("Capture stopped");
                    break;
                }
            },
            _ = next_tick(&mut ticker), if recording => {
                if !emit(&chunks, &mut pending).await {
                    break;
                }
            }
            read = reader.read_buf(&mut incoming), if started => match read {
                Ok(0) => {
                    tracing::debug!("Capture source reached end of input");
                    break;
                }
                Ok(_) => {
                    if recording {
                        pending.extend_from_slice(&incoming);
                    }
                    incoming.clear();
                    incoming.reserve(READ_CHUNK);
                }
                Err(err) => {
                    *phase.lock() = Phase::Stopped;
                    tracing::warn!(error = %err, "Capture read failed");
                    if chunks.send(Err(CaptureError::Read(err))).await.is_err() {
                        tracing::trace!("Capture consumer gone before read error was delivered");
                    }
                    return;
                }
            },
        }
    }

    *phase.lock() = Phase::Stopped;
    emit(&chunks, &mut pending).await;
}

fn slice_interval(slice: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + slice, slice);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Send the pending bytes as one chunk. Returns `false` once the consumer
/// is gone.
async fn emit(chunks: &mpsc::Sender<ChunkResult>, pending: &mut BytesMut) -> bool {
    if pending.is_empty() {
        return !chunks.is_closed();
    }
    let chunk = pending.split().freeze();
    tracing::trace!(bytes = chunk.len(), "Chunk ready");
    chunks.send(Ok(chunk)).await.is_ok()
}
