use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::capture::CaptureHandle;
use crate::guard::ExitCallback;
use crate::pipe::{PipeHandle, PipeReport, TransferError, TransferPipe};
use crate::resource::{ActorHandle, ActorId, ActorReport, Resource, ResourceActor, ResourceKind};
use crate::session::{
    Action, Effect, ReadyResource, SessionError, SessionEvent, SessionMachine, Snapshot,
};
use crate::teardown::{Teardown, TeardownReport};

use super::client::RecorderHandle;
use super::types::{Providers, RecorderCommand, RecorderSettings};

const COMMAND_BUFFER: usize = 16;

/// Orchestrator event loop.
///
/// Owns the session machine and everything the current cycle acquired.
/// User actions and resource reports are funnelled into one loop and
/// processed one at a time; effects of a transition are executed before
/// the next event is read.
pub struct Recorder {
    machine: SessionMachine,
    providers: Providers,
    settings: RecorderSettings,
    events: mpsc::UnboundedSender<SessionEvent>,
    actors: Vec<ActorHandle>,
    pipe: Option<PipeHandle>,
    teardowns: Vec<JoinHandle<TeardownReport>>,
    snapshots: watch::Sender<Snapshot>,
}

impl Recorder {
    /// Start the event loop on the current runtime.
    pub fn spawn(settings: RecorderSettings, providers: Providers) -> RecorderHandle {
        let machine = SessionMachine::new();
        let (snapshots, snapshot_rx) = watch::channel(machine.snapshot());
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let recorder = Recorder {
            machine,
            providers,
            settings,
            events: event_tx,
            actors: Vec::new(),
            pipe: None,
            teardowns: Vec::new(),
            snapshots,
        };
        tokio::spawn(recorder.run(command_rx, event_rx));

        RecorderHandle::new(command_tx, snapshot_rx)
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<RecorderCommand>,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        tracing::debug!("Recorder started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(RecorderCommand::Action(action)) => self.dispatch(action.into()),
                    Some(RecorderCommand::Shutdown { respond_to }) => {
                        let reports = self.shutdown(&mut events).await;
                        if respond_to.send(reports).is_err() {
                            tracing::trace!("Shutdown response dropped (receiver gone)");
                        }
                        break;
                    }
                    None => {
                        self.shutdown(&mut events).await;
                        break;
                    }
                },
                Some(event) = events.recv() => self.dispatch(event),
            }
        }
        tracing::debug!("Recorder stopped");
    }

    /// Run one event to completion and publish the resulting snapshot.
    fn dispatch(&mut self, event: SessionEvent) {
        let effects = self.machine.handle(event);
        for effect in effects {
            self.apply(effect);
        }

        let next = self.machine.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn apply(&mut self, effect: Effect) {
        tracing::trace!(?effect, "Applying effect");
        match effect {
            Effect::Acquire { id, kind } => self.acquire(id, kind),
            Effect::StartCapture { slice } => {
                if let Some(capture) = self.capture() {
                    capture.start(slice);
                }
            }
            Effect::StartPipe { id } => self.start_pipe(id),
            Effect::PauseCapture { flush } => {
                if let Some(capture) = self.capture() {
                    capture.pause(flush);
                }
            }
            Effect::ResumeCapture => {
                if let Some(capture) = self.capture() {
                    capture.resume();
                }
            }
            Effect::StopCapture => {
                if let Some(capture) = self.capture() {
                    capture.stop();
                }
            }
            Effect::Teardown { session } => {
                self.teardowns.retain(|task| !task.is_finished());
                let teardown = Teardown {
                    session,
                    pipe: self.pipe.take(),
                    actors: std::mem::take(&mut self.actors),
                    grace: self.settings.grace,
                };
                self.teardowns.push(teardown.spawn());
            }
        }
    }

    fn capture(&self) -> Option<CaptureHandle> {
        self.machine.context().and_then(|ctx| ctx.capture.clone())
    }

    fn acquire(&mut self, id: ActorId, kind: ResourceKind) {
        let Some(ctx) = self.machine.context() else {
            tracing::warn!(%id, resource = %kind, "Acquire requested without a session");
            return;
        };

        let actor = match kind {
            ResourceKind::Capture => spawn_actor(
                id,
                &self.providers.capture,
                ctx.capture_options.clone(),
                &self.events,
                ReadyResource::Capture,
            ),
            ResourceKind::Sink => spawn_actor(
                id,
                &self.providers.sink,
                ctx.sink_options.clone(),
                &self.events,
                ReadyResource::Sink,
            ),
            ResourceKind::PowerLock => match &self.providers.power_lock {
                Some(provider) => spawn_actor(
                    id,
                    provider,
                    self.settings.lock_kind,
                    &self.events,
                    |_| ReadyResource::PowerLock,
                ),
                None => {
                    tracing::debug!(%id, "Power lock disabled");
                    return;
                }
            },
            ResourceKind::ExitGuard => match &self.providers.exit_guard {
                Some(provider) => {
                    let callback = exit_callback(ctx.capture.clone(), self.settings.block_exit);
                    spawn_actor(id, provider, callback, &self.events, |_| {
                        ReadyResource::ExitGuard
                    })
                }
                None => {
                    tracing::debug!(%id, "Exit guard disabled");
                    return;
                }
            },
            ResourceKind::Pipe => {
                tracing::warn!(%id, "The pipe is started, not acquired");
                return;
            }
        };
        self.actors.push(actor);
    }

    fn start_pipe(&mut self, id: ActorId) {
        let endpoints = self
            .machine
            .context()
            .and_then(|ctx| Some((ctx.capture.clone()?, ctx.sink.clone()?)));
        let Some((capture, sink)) = endpoints else {
            tracing::warn!(%id, "Pipe requested before both endpoints are ready");
            return;
        };

        let Some(chunks) = capture.take_chunks() else {
            self.report(SessionEvent::Error {
                id,
                cause: SessionError::Transfer(TransferError::SourceUnavailable),
            });
            return;
        };

        let events = self.events.clone();
        let pipe = TransferPipe::spawn(id, chunks, sink, move |report| {
            let event = match report {
                PipeReport::Done { id } => SessionEvent::PipeDone { id },
                PipeReport::Error { id, cause } => SessionEvent::Error {
                    id,
                    cause: SessionError::Transfer(cause),
                },
            };
            if events.send(event).is_err() {
                tracing::trace!(%id, "Pipe report dropped (recorder gone)");
            }
        });
        self.pipe = Some(pipe);
    }

    /// Queue an event behind the current one.
    fn report(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("Event dropped (recorder gone)");
        }
    }

    /// Stop the active session and wait until every teardown has finished.
    async fn shutdown(
        &mut self,
        events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    ) -> Vec<TeardownReport> {
        self.dispatch(Action::Stop.into());

        // Drain until the capture ends the stream; a second stop forces it.
        while !self.machine.state().is_inactive() {
            match tokio::time::timeout(self.settings.grace, events.recv()).await {
                Ok(Some(event)) => self.dispatch(event),
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!("Capture did not drain in time, forcing stop");
                    self.dispatch(Action::Stop.into());
                }
            }
        }

        let pending = std::mem::take(&mut self.teardowns);
        join_all(pending)
            .await
            .into_iter()
            .filter_map(|result| match result {
                Ok(report) => Some(report),
                Err(err) => {
                    tracing::warn!(error = %err, "Teardown task failed");
                    None
                }
            })
            .collect()
    }
}

/// Spawn an actor whose report lands in the recorder's event queue.
fn spawn_actor<R, M>(
    id: ActorId,
    provider: &Arc<R>,
    input: R::Input,
    events: &mpsc::UnboundedSender<SessionEvent>,
    ready: M,
) -> ActorHandle
where
    R: Resource + ?Sized,
    M: FnOnce(R::Handle) -> ReadyResource + Send + 'static,
{
    let kind = provider.kind();
    let events = events.clone();
    ResourceActor::spawn(id, Arc::clone(provider), input, move |report| {
        let event = match report {
            ActorReport::Ready { id, handle } => SessionEvent::Ready {
                id,
                resource: ready(handle),
            },
            ActorReport::Error { id, cause } => SessionEvent::Error {
                id,
                cause: SessionError::from_acquire(kind, cause),
            },
        };
        if events.send(event).is_err() {
            tracing::trace!(%id, resource = %kind, "Actor report dropped (recorder gone)");
        }
    })
}

/// The session's exit guard: push what has been recorded so far into the
/// sink, then answer whether exit should be blocked.
fn exit_callback(capture: Option<CaptureHandle>, block_exit: bool) -> ExitCallback {
    Arc::new(move || {
        if let Some(capture) = &capture {
            capture.request_data();
        }
        block_exit
    })
}
