//! Transition function of the recording session.
//!
//! Pure with respect to the outside world: every side effect is returned as
//! an [`Effect`] for the runtime to execute before the next event.

use uuid::Uuid;

use crate::resource::{ActorId, IdAllocator, ResourceKind};

use super::error::SessionError;
use super::event::{Action, Effect, ReadyResource, SessionEvent};
use super::snapshot::{Outcome, Snapshot};
use super::state::{
    Acquisition, ActiveState, Branch, RecordingState, SessionContext, SessionState,
};

pub struct SessionMachine {
    state: SessionState,
    context: Option<SessionContext>,
    ids: IdAllocator,
    last_outcome: Option<Outcome>,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self {
            state: SessionState::Inactive,
            context: None,
            ids: IdAllocator::new(),
            last_outcome: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Context of the running cycle, `None` while inactive.
    pub fn context(&self) -> Option<&SessionContext> {
        self.context.as_ref()
    }

    pub fn last_outcome(&self) -> Option<&Outcome> {
        self.last_outcome.as_ref()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state.path(),
            valid_actions: self.state.valid_actions(),
            session: self.context.as_ref().map(|ctx| ctx.session),
            last_outcome: self.last_outcome.clone(),
        }
    }

    /// Process one event to completion.
    pub fn handle(&mut self, event: SessionEvent) -> Vec<Effect> {
        match event {
            SessionEvent::Action(action) => self.on_action(action),
            SessionEvent::Ready { id, resource } => self.on_ready(id, resource),
            SessionEvent::Error { id, cause } => self.on_error(id, cause),
            SessionEvent::PipeDone { id } => self.on_pipe_done(id),
        }
    }

    fn on_action(&mut self, action: Action) -> Vec<Effect> {
        let kind = action.kind();
        match (self.state, action) {
            (SessionState::Inactive, Action::Record { capture, sink }) => {
                let session = Uuid::new_v4();
                let capture_id = self.ids.next_id();
                let sink_id = self.ids.next_id();
                tracing::info!(%session, capture = %capture_id, sink = %sink_id, "Recording requested");

                self.context = Some(SessionContext {
                    session,
                    capture_options: capture,
                    sink_options: sink,
                    capture_id,
                    sink_id,
                    capture: None,
                    sink: None,
                    pipe_id: None,
                    best_effort_ids: Vec::new(),
                });
                self.state = SessionState::Recording(RecordingState::Acquiring(Acquisition::new()));
                vec![
                    Effect::Acquire {
                        id: capture_id,
                        kind: ResourceKind::Capture,
                    },
                    Effect::Acquire {
                        id: sink_id,
                        kind: ResourceKind::Sink,
                    },
                ]
            }

            (SessionState::Recording(RecordingState::Active(ActiveState::Recording)), Action::Pause) => {
                let flush = self
                    .context
                    .as_ref()
                    .map(|ctx| ctx.capture_options.flush_on_pause)
                    .unwrap_or(true);
                self.state = SessionState::Recording(RecordingState::Active(ActiveState::Paused));
                vec![Effect::PauseCapture { flush }]
            }

            (SessionState::Recording(RecordingState::Active(ActiveState::Paused)), Action::Resume) => {
                self.state = SessionState::Recording(RecordingState::Active(ActiveState::Recording));
                vec![Effect::ResumeCapture]
            }

            (SessionState::Recording(RecordingState::Acquiring(_)), Action::Stop) => {
                tracing::info!("Stopped before acquisition completed");
                self.finish(Outcome::Done)
            }

            (
                SessionState::Recording(RecordingState::Active(
                    ActiveState::Recording | ActiveState::Paused,
                )),
                Action::Stop,
            ) => {
                self.state = SessionState::Recording(RecordingState::Active(ActiveState::Stopping));
                vec![Effect::StopCapture]
            }

            (SessionState::Recording(RecordingState::Active(ActiveState::Stopping)), Action::Stop) => {
                tracing::warn!("Stop repeated while draining, forcing completion");
                self.finish(Outcome::Done)
            }

            (state, _) => {
                tracing::debug!(action = %kind, state = state.path(), "Ignoring action");
                Vec::new()
            }
        }
    }

    fn on_ready(&mut self, id: ActorId, resource: ReadyResource) -> Vec<Effect> {
        let Some(ctx) = self.context.as_mut() else {
            tracing::debug!(%id, resource = %resource.kind(), "Ready from a finished cycle");
            return Vec::new();
        };

        if ctx.best_effort_ids.contains(&id) {
            tracing::debug!(%id, resource = %resource.kind(), "Best-effort resource ready");
            return Vec::new();
        }

        let SessionState::Recording(RecordingState::Acquiring(mut acquisition)) = self.state else {
            tracing::debug!(%id, resource = %resource.kind(), state = self.state.path(), "Ready outside acquisition");
            return Vec::new();
        };

        match resource {
            ReadyResource::Capture(handle)
                if id == ctx.capture_id && acquisition.capture == Branch::Acquiring =>
            {
                ctx.capture = Some(handle);
                acquisition.capture = Branch::Ready;
            }
            ReadyResource::Sink(handle)
                if id == ctx.sink_id && acquisition.sink == Branch::Acquiring =>
            {
                ctx.sink = Some(handle);
                acquisition.sink = Branch::Ready;
            }
            other => {
                tracing::debug!(%id, resource = %other.kind(), "Ignoring uncorrelated ready");
                return Vec::new();
            }
        }
        tracing::debug!(%id, session = %ctx.session, "Branch ready");

        if !acquisition.is_complete() {
            self.state = SessionState::Recording(RecordingState::Acquiring(acquisition));
            return Vec::new();
        }
        self.activate()
    }

    /// Join point of the acquisition regions.
    fn activate(&mut self) -> Vec<Effect> {
        let pipe_id = self.ids.next_id();
        let power_id = self.ids.next_id();
        let guard_id = self.ids.next_id();

        let Some(ctx) = self.context.as_mut() else {
            return Vec::new();
        };
        ctx.pipe_id = Some(pipe_id);
        ctx.best_effort_ids = vec![power_id, guard_id];
        tracing::info!(session = %ctx.session, pipe = %pipe_id, "Recording active");

        self.state = SessionState::Recording(RecordingState::Active(ActiveState::Recording));
        vec![
            Effect::StartCapture {
                slice: ctx.capture_options.slice,
            },
            Effect::StartPipe { id: pipe_id },
            Effect::Acquire {
                id: power_id,
                kind: ResourceKind::PowerLock,
            },
            Effect::Acquire {
                id: guard_id,
                kind: ResourceKind::ExitGuard,
            },
        ]
    }

    fn on_error(&mut self, id: ActorId, cause: SessionError) -> Vec<Effect> {
        let Some(ctx) = self.context.as_ref() else {
            tracing::debug!(%id, error = %cause, "Error from a finished cycle");
            return Vec::new();
        };

        if ctx.best_effort_ids.contains(&id) {
            tracing::warn!(%id, session = %ctx.session, error = %cause, "Best-effort resource failed");
            return Vec::new();
        }

        if !ctx.owns(id) {
            tracing::debug!(%id, error = %cause, "Ignoring uncorrelated error");
            return Vec::new();
        }

        tracing::error!(%id, session = %ctx.session, error = %cause, "Session failed");
        self.finish(Outcome::Error {
            message: cause.to_string(),
        })
    }

    fn on_pipe_done(&mut self, id: ActorId) -> Vec<Effect> {
        match self.context.as_ref() {
            Some(ctx) if ctx.pipe_id == Some(id) => {
                tracing::info!(session = %ctx.session, "Capture drained");
                self.finish(Outcome::Done)
            }
            _ => {
                tracing::debug!(%id, "Ignoring uncorrelated pipe completion");
                Vec::new()
            }
        }
    }

    /// Leave the composite through `Done` or `Error`.
    fn finish(&mut self, outcome: Outcome) -> Vec<Effect> {
        self.state = SessionState::Inactive;
        self.last_outcome = Some(outcome);
        match self.context.take() {
            Some(ctx) => vec![Effect::Teardown {
                session: ctx.session,
            }],
            None => Vec::new(),
        }
    }
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureOptions, CaptureState, CaptureSource, ChunkReceiver};
    use crate::resource::AcquireError;
    use crate::sink::SinkOptions;
    use std::sync::Arc;
    use std::time::Duration;

    struct Inert;

    impl CaptureSource for Inert {
        fn start(&self, _slice: Option<Duration>) {}
        fn pause(&self, _flush: bool) {}
        fn resume(&self) {}
        fn stop(&self) {}
        fn request_data(&self) {}
        fn state(&self) -> CaptureState {
            CaptureState::Inactive
        }
        fn take_chunks(&self) -> Option<ChunkReceiver> {
            None
        }
    }

    fn record() -> SessionEvent {
        Action::Record {
            capture: CaptureOptions::default(),
            sink: SinkOptions::default(),
        }
        .into()
    }

    fn acquire_ids(effects: &[Effect]) -> (ActorId, ActorId) {
        match effects {
            [Effect::Acquire { id: capture, kind: ResourceKind::Capture }, Effect::Acquire { id: sink, kind: ResourceKind::Sink }] => {
                (*capture, *sink)
            }
            other => panic!("unexpected effects: {other:?}"),
        }
    }

    #[test]
    fn record_enters_acquiring_with_two_actors() {
        let mut machine = SessionMachine::new();
        let effects = machine.handle(record());
        let (capture, sink) = acquire_ids(&effects);
        assert_ne!(capture, sink);
        assert_eq!(machine.state().path(), "recording.acquiring");
        assert!(machine.snapshot().session.is_some());
    }

    #[test]
    fn ready_with_wrong_variant_is_ignored() {
        let mut machine = SessionMachine::new();
        let (capture, _sink) = acquire_ids(&machine.handle(record()));
        let effects = machine.handle(SessionEvent::Ready {
            id: capture,
            resource: ReadyResource::PowerLock,
        });
        assert!(effects.is_empty());
        assert_eq!(
            machine.state(),
            SessionState::Recording(RecordingState::Acquiring(Acquisition::new()))
        );
    }

    #[test]
    fn duplicate_ready_does_not_reenter() {
        let mut machine = SessionMachine::new();
        let (capture, _sink) = acquire_ids(&machine.handle(record()));
        let ready = || SessionEvent::Ready {
            id: capture,
            resource: ReadyResource::Capture(Arc::new(Inert)),
        };
        assert!(machine.handle(ready()).is_empty());
        assert!(machine.handle(ready()).is_empty());
        match machine.state() {
            SessionState::Recording(RecordingState::Acquiring(acq)) => {
                assert_eq!(acq.capture, Branch::Ready);
                assert_eq!(acq.sink, Branch::Acquiring);
            }
            other => panic!("Expected Acquiring, got {}", other.path()),
        }
    }

    #[test]
    fn acquisition_error_records_outcome() {
        let mut machine = SessionMachine::new();
        let (_capture, sink) = acquire_ids(&machine.handle(record()));
        let effects = machine.handle(SessionEvent::Error {
            id: sink,
            cause: SessionError::from_acquire(
                ResourceKind::Sink,
                AcquireError::Unavailable("disk full".to_string()),
            ),
        });
        assert!(matches!(effects.as_slice(), [Effect::Teardown { .. }]));
        assert!(machine.state().is_inactive());
        assert!(matches!(
            machine.last_outcome(),
            Some(Outcome::Error { message }) if message.contains("disk full")
        ));
    }

    #[test]
    fn pause_outside_active_is_ignored() {
        let mut machine = SessionMachine::new();
        assert!(machine.handle(Action::Pause.into()).is_empty());
        assert!(machine.handle(Action::Resume.into()).is_empty());
        assert!(machine.handle(Action::Stop.into()).is_empty());
        assert!(machine.state().is_inactive());
        assert!(machine.last_outcome().is_none());
    }
}
