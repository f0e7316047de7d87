//! Power-management locks.
//!
//! Keeps the machine from idling or suspending while recording. The lock is
//! best-effort: acquisition is retried with backoff and a lost lock is
//! reacquired in the background by [`crate::retry::RetryDriver`].

mod inhibit;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use inhibit::{InhibitBackend, InhibitLease};

/// What the lock prevents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockKind {
    /// Screen blanking / idle actions.
    #[default]
    Idle,
    /// System suspend.
    Sleep,
}

impl LockKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LockKind::Idle => "idle",
            LockKind::Sleep => "sleep",
        }
    }
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
