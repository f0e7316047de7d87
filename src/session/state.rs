//! Session state as an explicit tagged union.
//!
//! ```text
//! Inactive ──record──→ Recording
//!                       ├─ Acquiring { capture: Acquiring→Ready, sink: Acquiring→Ready }
//!                       └─ Active: Recording ⇄ Paused → Stopping
//! ```
//!
//! `Done` and `Error` are not resting states: reaching either tears the
//! cycle down and lands back in `Inactive` within the same transition.

use uuid::Uuid;

use crate::capture::{CaptureHandle, CaptureOptions};
use crate::resource::ActorId;
use crate::sink::{SinkHandle, SinkOptions};

use super::event::ActionKind;

/// One region of the parallel `Acquiring` phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Acquiring,
    Ready,
}

/// Product of the two acquisition regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acquisition {
    pub capture: Branch,
    pub sink: Branch,
}

impl Acquisition {
    pub fn new() -> Self {
        Self {
            capture: Branch::Acquiring,
            sink: Branch::Acquiring,
        }
    }

    /// Join predicate: every region reached `Ready`.
    pub fn is_complete(&self) -> bool {
        self.capture == Branch::Ready && self.sink == Branch::Ready
    }
}

impl Default for Acquisition {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveState {
    Recording,
    Paused,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Acquiring(Acquisition),
    Active(ActiveState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Inactive,
    Recording(RecordingState),
}

impl SessionState {
    /// Dotted path through the hierarchy, e.g. `recording.active.paused`.
    pub fn path(&self) -> &'static str {
        match self {
            SessionState::Inactive => "inactive",
            SessionState::Recording(RecordingState::Acquiring(_)) => "recording.acquiring",
            SessionState::Recording(RecordingState::Active(ActiveState::Recording)) => {
                "recording.active.recording"
            }
            SessionState::Recording(RecordingState::Active(ActiveState::Paused)) => {
                "recording.active.paused"
            }
            SessionState::Recording(RecordingState::Active(ActiveState::Stopping)) => {
                "recording.active.stopping"
            }
        }
    }

    /// Actions that currently cause a transition.
    pub fn valid_actions(&self) -> Vec<ActionKind> {
        match self {
            SessionState::Inactive => vec![ActionKind::Record],
            SessionState::Recording(RecordingState::Acquiring(_)) => vec![ActionKind::Stop],
            SessionState::Recording(RecordingState::Active(ActiveState::Recording)) => {
                vec![ActionKind::Pause, ActionKind::Stop]
            }
            SessionState::Recording(RecordingState::Active(ActiveState::Paused)) => {
                vec![ActionKind::Resume, ActionKind::Stop]
            }
            SessionState::Recording(RecordingState::Active(ActiveState::Stopping)) => {
                vec![ActionKind::Stop]
            }
        }
    }

    pub fn is_inactive(&self) -> bool {
        matches!(self, SessionState::Inactive)
    }
}

/// Data owned by one session cycle. Dropped when the cycle ends.
pub struct SessionContext {
    pub session: Uuid,
    pub capture_options: CaptureOptions,
    pub sink_options: SinkOptions,
    pub capture_id: ActorId,
    pub sink_id: ActorId,
    /// Valid once the capture branch is `Ready`.
    pub capture: Option<CaptureHandle>,
    /// Valid once the sink branch is `Ready`.
    pub sink: Option<SinkHandle>,
    pub pipe_id: Option<ActorId>,
    /// Power lock and exit guard actors of this cycle.
    pub best_effort_ids: Vec<ActorId>,
}

impl SessionContext {
    pub fn owns(&self, id: ActorId) -> bool {
        id == self.capture_id
            || id == self.sink_id
            || self.pipe_id == Some(id)
            || self.best_effort_ids.contains(&id)
    }
}
