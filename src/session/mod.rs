//! Recording session orchestration.
//!
//! The session is an explicit state machine fed one [`SessionEvent`] at a
//! time. Each transition mutates the cycle's [`SessionContext`] and returns
//! the [`Effect`]s the runtime must perform. Resource lifecycle events carry
//! the originating actor's [`ActorId`](crate::resource::ActorId); events
//! whose id does not belong to the current cycle are dropped.

mod error;
mod event;
mod machine;
mod snapshot;
mod state;

pub use error::SessionError;
pub use event::{Action, ActionKind, Effect, ReadyResource, SessionEvent};
pub use machine::SessionMachine;
pub use snapshot::{Outcome, Snapshot};
pub use state::{
    Acquisition, ActiveState, Branch, RecordingState, SessionContext, SessionState,
};
