//! Exit guards.
//!
//! While a recording is live the process should not exit without at least
//! trying to flush what was captured so far. Guards are callbacks
//! registered in a process-wide [`ExitGuards`] registry; the binary
//! consults the registry on every exit attempt (Ctrl-C).

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::resource::{AcquireError, ReleaseError, Resource, ResourceKind};

/// Invoked on exit attempts. Returning `false` vetoes the default policy
/// of blocking exit.
pub type ExitCallback = Arc<dyn Fn() -> bool + Send + Sync>;

#[derive(Default)]
struct GuardTable {
    next: u64,
    callbacks: BTreeMap<u64, ExitCallback>,
}

/// Registry of active exit guards.
#[derive(Clone, Default)]
pub struct ExitGuards {
    table: Arc<Mutex<GuardTable>>,
}

impl ExitGuards {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, callback: ExitCallback) -> GuardRegistration {
        let mut table = self.table.lock();
        let id = table.next;
        table.next += 1;
        table.callbacks.insert(id, callback);
        GuardRegistration {
            id,
            guards: self.clone(),
        }
    }

    pub fn active(&self) -> usize {
        self.table.lock().callbacks.len()
    }

    /// Run every registered callback and decide whether to block exit.
    ///
    /// Exit is blocked if any callback does not veto.
    pub fn should_block(&self) -> bool {
        let callbacks: Vec<ExitCallback> = self.table.lock().callbacks.values().cloned().collect();
        let mut block = false;
        for callback in callbacks {
            if callback() {
                block = true;
            }
        }
        block
    }
}

/// One registered guard. Clones refer to the same registration.
#[derive(Clone)]
pub struct GuardRegistration {
    id: u64,
    guards: ExitGuards,
}

impl GuardRegistration {
    /// Returns `false` if the guard was already removed.
    pub fn unregister(&self) -> bool {
        self.guards.table.lock().callbacks.remove(&self.id).is_some()
    }
}

/// Registers the session's exit guard as a best-effort resource.
pub struct ExitGuardProvider {
    guards: ExitGuards,
}

impl ExitGuardProvider {
    pub fn new(guards: ExitGuards) -> Self {
        Self { guards }
    }
}

#[async_trait]
impl Resource for ExitGuardProvider {
    type Input = ExitCallback;
    type Handle = GuardRegistration;

    fn kind(&self) -> ResourceKind {
        ResourceKind::ExitGuard
    }

    async fn acquire(
        &self,
        callback: ExitCallback,
        cancel: CancellationToken,
    ) -> Result<GuardRegistration, AcquireError> {
        if cancel.is_cancelled() {
            return Err(AcquireError::Cancelled);
        }
        Ok(self.guards.register(callback))
    }

    async fn release(&self, registration: GuardRegistration) -> Result<(), ReleaseError> {
        if registration.unregister() {
            Ok(())
        } else {
            Err(ReleaseError::AlreadyClosed)
        }
    }
}
