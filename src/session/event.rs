//! Inbound events and outbound effects of the session machine.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::capture::{CaptureHandle, CaptureOptions};
use crate::resource::{ActorId, ResourceKind};
use crate::sink::{SinkHandle, SinkOptions};

use super::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Record,
    Pause,
    Resume,
    Stop,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Record => "record",
            ActionKind::Pause => "pause",
            ActionKind::Resume => "resume",
            ActionKind::Stop => "stop",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User actions sent by the presentation layer.
#[derive(Debug, Clone)]
pub enum Action {
    Record {
        capture: CaptureOptions,
        sink: SinkOptions,
    },
    Pause,
    Resume,
    Stop,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Record { .. } => ActionKind::Record,
            Action::Pause => ActionKind::Pause,
            Action::Resume => ActionKind::Resume,
            Action::Stop => ActionKind::Stop,
        }
    }
}

/// Payload of a `Ready` report.
///
/// Best-effort resources keep their handles inside their actors; the
/// session only learns that they are up.
#[derive(Clone)]
pub enum ReadyResource {
    Capture(CaptureHandle),
    Sink(SinkHandle),
    PowerLock,
    ExitGuard,
}

impl ReadyResource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ReadyResource::Capture(_) => ResourceKind::Capture,
            ReadyResource::Sink(_) => ResourceKind::Sink,
            ReadyResource::PowerLock => ResourceKind::PowerLock,
            ReadyResource::ExitGuard => ResourceKind::ExitGuard,
        }
    }
}

impl fmt::Debug for ReadyResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReadyResource({})", self.kind())
    }
}

/// Everything the machine reacts to.
#[derive(Debug)]
pub enum SessionEvent {
    Action(Action),
    Ready { id: ActorId, resource: ReadyResource },
    Error { id: ActorId, cause: SessionError },
    PipeDone { id: ActorId },
}

impl From<Action> for SessionEvent {
    fn from(action: Action) -> Self {
        SessionEvent::Action(action)
    }
}

/// Side effects requested by a transition, executed by the runtime in
/// order before the next event is accepted.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Spawn a resource actor; options come from the session context.
    Acquire { id: ActorId, kind: ResourceKind },
    /// Start the capture unless it is already running.
    StartCapture { slice: Option<Duration> },
    StartPipe { id: ActorId },
    PauseCapture { flush: bool },
    ResumeCapture,
    StopCapture,
    /// Release everything of the cycle.
    Teardown { session: Uuid },
}
