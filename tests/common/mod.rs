//! Shared test utilities and mock resources.

#![allow(dead_code, unused_imports)]

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use taperec::capture::{
    CaptureError, CaptureHandle, CaptureOptions, CaptureSource, CaptureState, ChunkReceiver,
    ChunkResult,
};
use taperec::recorder::{Providers, Recorder, RecorderHandle, RecorderSettings};
use taperec::resource::{AcquireError, ReleaseError, Resource, ResourceKind};
use taperec::retry::FlakyResource;
use taperec::session::{Action, Snapshot};
use taperec::sink::{ChunkSink, SinkError, SinkHandle, SinkOptions};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// A latch: closed until opened, then open forever.
#[derive(Clone)]
pub struct Gate {
    open: Arc<watch::Sender<bool>>,
}

impl Gate {
    pub fn closed() -> Self {
        Self {
            open: Arc::new(watch::channel(false).0),
        }
    }

    pub fn opened() -> Self {
        let gate = Self::closed();
        gate.open();
        gate
    }

    pub fn open(&self) {
        self.open.send_replace(true);
    }

    pub async fn wait(&self) {
        let mut rx = self.open.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }
}

// ---------------------------------------------------------------------------
// Generic counting resource
// ---------------------------------------------------------------------------

/// Resource with `u32` handles that records every call. Acquisition waits
/// on `gate` and ignores the cancel token, like an OS prompt would.
pub struct CountingResource {
    pub kind: ResourceKind,
    pub gate: Gate,
    pub fail_with: Option<String>,
    pub release_error: Option<ReleaseError>,
    pub started: AtomicUsize,
    pub settled: AtomicUsize,
    pub released: AtomicUsize,
    /// Order of `settle`/`release` calls.
    pub log: Mutex<Vec<&'static str>>,
    next: AtomicU32,
}

impl CountingResource {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            gate: Gate::opened(),
            fail_with: None,
            release_error: None,
            started: AtomicUsize::new(0),
            settled: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
            next: AtomicU32::new(1),
        }
    }

    pub fn gated(mut self, gate: Gate) -> Self {
        self.gate = gate;
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.fail_with = Some(message.to_string());
        self
    }

    pub fn release_error(mut self, err: ReleaseError) -> Self {
        self.release_error = Some(err);
        self
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn settled(&self) -> usize {
        self.settled.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resource for CountingResource {
    type Input = ();
    type Handle = u32;

    fn kind(&self) -> ResourceKind {
        self.kind
    }

    async fn acquire(&self, _input: (), _cancel: CancellationToken) -> Result<u32, AcquireError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        self.gate.wait().await;
        self.settled.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push("settle");
        match &self.fail_with {
            Some(message) => Err(AcquireError::Unavailable(message.clone())),
            None => Ok(self.next.fetch_add(1, Ordering::SeqCst)),
        }
    }

    async fn release(&self, _handle: u32) -> Result<(), ReleaseError> {
        self.released.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push("release");
        match &self.release_error {
            Some(ReleaseError::AlreadyClosed) => Err(ReleaseError::AlreadyClosed),
            Some(ReleaseError::Failed(message)) => Err(ReleaseError::Failed(message.clone())),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

/// Capture whose chunks are pushed by the test. `stop()` ends the stream.
pub struct FakeCapture {
    state: Mutex<CaptureState>,
    sender: Mutex<Option<mpsc::Sender<ChunkResult>>>,
    chunks: Mutex<Option<ChunkReceiver>>,
    calls: Mutex<Vec<String>>,
}

impl FakeCapture {
    pub fn new(queue_depth: usize) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        Arc::new(Self {
            state: Mutex::new(CaptureState::Inactive),
            sender: Mutex::new(Some(tx)),
            chunks: Mutex::new(Some(rx)),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Queue a chunk; false if the queue is full or the stream ended.
    pub fn push(&self, data: &'static [u8]) -> bool {
        match self.sender.lock().as_ref() {
            Some(tx) => tx.try_send(Ok(Bytes::from_static(data))).is_ok(),
            None => false,
        }
    }

    /// Queue a fault and end the stream.
    pub fn fail(&self, message: &str) {
        if let Some(tx) = self.sender.lock().take() {
            let _ = tx.try_send(Err(CaptureError::Fault(message.to_string())));
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

impl CaptureSource for FakeCapture {
    fn start(&self, slice: Option<Duration>) {
        self.record(format!("start({:?})", slice.map(|s| s.as_millis())));
        let mut state = self.state.lock();
        if *state == CaptureState::Inactive {
            *state = CaptureState::Recording;
        }
    }

    fn pause(&self, flush: bool) {
        self.record(format!("pause(flush={flush})"));
        *self.state.lock() = CaptureState::Paused;
    }

    fn resume(&self) {
        self.record("resume".to_string());
        *self.state.lock() = CaptureState::Recording;
    }

    fn stop(&self) {
        self.record("stop".to_string());
        *self.state.lock() = CaptureState::Inactive;
        self.sender.lock().take();
    }

    fn request_data(&self) {
        self.record("request_data".to_string());
    }

    fn state(&self) -> CaptureState {
        *self.state.lock()
    }

    fn take_chunks(&self) -> Option<ChunkReceiver> {
        self.chunks.lock().take()
    }
}

pub struct FakeCaptureProvider {
    pub gate: Gate,
    pub fail_with: Option<String>,
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
    pub last: Mutex<Option<Arc<FakeCapture>>>,
    pub inputs: Mutex<Vec<CaptureOptions>>,
}

impl FakeCaptureProvider {
    pub fn new() -> Self {
        Self {
            gate: Gate::opened(),
            fail_with: None,
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            last: Mutex::new(None),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn gated(mut self, gate: Gate) -> Self {
        self.gate = gate;
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.fail_with = Some(message.to_string());
        self
    }

    pub fn last(&self) -> Arc<FakeCapture> {
        self.last.lock().clone().expect("no capture acquired yet")
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resource for FakeCaptureProvider {
    type Input = CaptureOptions;
    type Handle = CaptureHandle;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Capture
    }

    async fn acquire(
        &self,
        options: CaptureOptions,
        _cancel: CancellationToken,
    ) -> Result<CaptureHandle, AcquireError> {
        self.gate.wait().await;
        if let Some(message) = &self.fail_with {
            return Err(AcquireError::Unavailable(message.clone()));
        }
        let capture = FakeCapture::new(options.queue_depth);
        self.inputs.lock().push(options);
        *self.last.lock() = Some(Arc::clone(&capture));
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(capture)
    }

    async fn release(&self, capture: CaptureHandle) -> Result<(), ReleaseError> {
        capture.stop();
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// In-memory sink. Writes wait on `write_gate`.
pub struct MemorySink {
    chunks: Mutex<Vec<Bytes>>,
    closed: AtomicBool,
    aborted: Mutex<Option<String>>,
    write_gate: Gate,
    fail_writes: bool,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Self::with_gate(Gate::opened(), false)
    }

    pub fn with_gate(write_gate: Gate, fail_writes: bool) -> Arc<Self> {
        Arc::new(Self {
            chunks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            aborted: Mutex::new(None),
            write_gate,
            fail_writes,
        })
    }

    pub fn chunks(&self) -> Vec<Bytes> {
        self.chunks.lock().clone()
    }

    pub fn data(&self) -> Vec<u8> {
        self.chunks.lock().iter().flat_map(|c| c.iter().copied()).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn aborted(&self) -> Option<String> {
        self.aborted.lock().clone()
    }
}

#[async_trait]
impl ChunkSink for MemorySink {
    async fn write(&self, chunk: Bytes) -> Result<(), SinkError> {
        if self.is_closed() {
            return Err(SinkError::Closed);
        }
        self.write_gate.wait().await;
        if self.fail_writes {
            return Err(SinkError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "permission revoked",
            )));
        }
        self.chunks.lock().push(chunk);
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(SinkError::Closed);
        }
        Ok(())
    }

    async fn abort(&self, reason: &str) -> Result<(), SinkError> {
        self.closed.store(true, Ordering::SeqCst);
        *self.aborted.lock() = Some(reason.to_string());
        Ok(())
    }
}

pub struct MemorySinkProvider {
    pub gate: Gate,
    pub write_gate: Gate,
    pub fail_writes: bool,
    pub fail_with: Option<String>,
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
    pub last: Mutex<Option<Arc<MemorySink>>>,
    pub inputs: Mutex<Vec<SinkOptions>>,
}

impl MemorySinkProvider {
    pub fn new() -> Self {
        Self {
            gate: Gate::opened(),
            write_gate: Gate::opened(),
            fail_writes: false,
            fail_with: None,
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            last: Mutex::new(None),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn gated(mut self, gate: Gate) -> Self {
        self.gate = gate;
        self
    }

    pub fn slow_writes(mut self, write_gate: Gate) -> Self {
        self.write_gate = write_gate;
        self
    }

    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.fail_with = Some(message.to_string());
        self
    }

    pub fn last(&self) -> Arc<MemorySink> {
        self.last.lock().clone().expect("no sink acquired yet")
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resource for MemorySinkProvider {
    type Input = SinkOptions;
    type Handle = SinkHandle;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Sink
    }

    async fn acquire(
        &self,
        options: SinkOptions,
        _cancel: CancellationToken,
    ) -> Result<SinkHandle, AcquireError> {
        self.gate.wait().await;
        if let Some(message) = &self.fail_with {
            return Err(AcquireError::Unavailable(message.clone()));
        }
        let sink = MemorySink::with_gate(self.write_gate.clone(), self.fail_writes);
        self.inputs.lock().push(options);
        *self.last.lock() = Some(Arc::clone(&sink));
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(sink)
    }

    async fn release(&self, sink: SinkHandle) -> Result<(), ReleaseError> {
        self.released.fetch_add(1, Ordering::SeqCst);
        match sink.close().await {
            Ok(()) => Ok(()),
            Err(SinkError::Closed) => Err(ReleaseError::AlreadyClosed),
            Err(err) => Err(ReleaseError::Failed(err.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Flaky resource for the retry driver
// ---------------------------------------------------------------------------

/// Fails `failures` times, then hands out leases the test can revoke.
pub struct ScriptedFlaky {
    failures: AtomicU32,
    /// Failures to inject again after each loss.
    pub failures_after_loss: u32,
    pub attempts: Mutex<Vec<Instant>>,
    pub released: AtomicUsize,
    revoke: Arc<Notify>,
}

pub struct ScriptedLease {
    pub serial: usize,
}

impl ScriptedFlaky {
    pub fn new(failures: u32) -> Self {
        Self {
            failures: AtomicU32::new(failures),
            failures_after_loss: 0,
            attempts: Mutex::new(Vec::new()),
            released: AtomicUsize::new(0),
            revoke: Arc::new(Notify::new()),
        }
    }

    pub fn failing_after_loss(mut self, failures: u32) -> Self {
        self.failures_after_loss = failures;
        self
    }

    /// Revoke the current lease.
    pub fn lose(&self) {
        self.failures
            .store(self.failures_after_loss, Ordering::SeqCst);
        self.revoke.notify_one();
    }

    pub fn attempts(&self) -> usize {
        self.attempts.lock().len()
    }

    /// Gaps between consecutive attempts.
    pub fn gaps(&self) -> Vec<Duration> {
        let attempts = self.attempts.lock();
        attempts.windows(2).map(|w| w[1] - w[0]).collect()
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FlakyResource for ScriptedFlaky {
    type Input = ();
    type Lease = ScriptedLease;

    fn kind(&self) -> ResourceKind {
        ResourceKind::PowerLock
    }

    async fn attempt(&self, _input: &()) -> Result<ScriptedLease, AcquireError> {
        let serial = {
            let mut attempts = self.attempts.lock();
            attempts.push(Instant::now());
            attempts.len()
        };
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(AcquireError::Unavailable("not in foreground".to_string()));
        }
        Ok(ScriptedLease { serial })
    }

    async fn lost(&self, _lease: &mut ScriptedLease) {
        self.revoke.notified().await;
    }

    async fn release(&self, _lease: ScriptedLease) -> Result<(), ReleaseError> {
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Recorder helpers
// ---------------------------------------------------------------------------

pub struct Harness {
    pub capture: Arc<FakeCaptureProvider>,
    pub sink: Arc<MemorySinkProvider>,
    pub recorder: RecorderHandle,
}

impl Harness {
    pub fn start(capture: FakeCaptureProvider, sink: MemorySinkProvider) -> Self {
        Self::start_with(capture, sink, |providers| providers)
    }

    pub fn start_with(
        capture: FakeCaptureProvider,
        sink: MemorySinkProvider,
        extend: impl FnOnce(Providers) -> Providers,
    ) -> Self {
        let capture = Arc::new(capture);
        let sink = Arc::new(sink);
        let providers = extend(Providers::new(capture.clone(), sink.clone()));
        let settings = RecorderSettings {
            grace: Duration::from_millis(100),
            ..RecorderSettings::default()
        };
        let recorder = Recorder::spawn(settings, providers);
        Self {
            capture,
            sink,
            recorder,
        }
    }

    pub async fn send(&self, action: Action) {
        self.recorder.send(action).await.expect("recorder closed");
    }

    /// Wait until the published state path equals `path`.
    pub async fn wait_for(&self, path: &str) -> Snapshot {
        let mut rx = self.recorder.subscribe();
        let snapshot = tokio::time::timeout(TIMEOUT, rx.wait_for(|s| s.state == path))
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {path}, at {}", self.recorder.snapshot().state))
            .expect("recorder closed");
        snapshot.clone()
    }

    /// Wait until a session has ended and left an outcome behind.
    pub async fn wait_for_outcome(&self) -> Snapshot {
        let mut rx = self.recorder.subscribe();
        let snapshot = tokio::time::timeout(
            TIMEOUT,
            rx.wait_for(|s| s.state == "inactive" && s.last_outcome.is_some()),
        )
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for an outcome, at {}", self.recorder.snapshot().state))
        .expect("recorder closed");
        snapshot.clone()
    }
}

pub fn record() -> Action {
    Action::Record {
        capture: CaptureOptions::default(),
        sink: SinkOptions::default(),
    }
}

/// Poll `condition` until it holds or the test times out.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
