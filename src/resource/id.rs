use std::fmt;

use serde::Serialize;

/// Correlation id carried by every lifecycle event an actor emits.
///
/// Ids are allocated per acquisition cycle, so an event from a retried or
/// stale acquisition never matches the id the session is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ActorId(u64);

impl ActorId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic id source. An allocator never hands out the same id twice.
#[derive(Debug)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn next_id(&mut self) -> ActorId {
        let id = ActorId(self.next);
        self.next += 1;
        id
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether losing a resource ends the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criticality {
    /// Failure is fatal to the session.
    Mandatory,
    /// Failure only degrades the session and is logged.
    BestEffort,
}

/// The resources a session cycle coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Capture,
    Sink,
    Pipe,
    PowerLock,
    ExitGuard,
}

impl ResourceKind {
    /// Fixed per kind; not configurable at runtime.
    pub fn criticality(self) -> Criticality {
        match self {
            ResourceKind::Capture | ResourceKind::Sink | ResourceKind::Pipe => {
                Criticality::Mandatory
            }
            ResourceKind::PowerLock | ResourceKind::ExitGuard => Criticality::BestEffort,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Capture => "capture",
            ResourceKind::Sink => "sink",
            ResourceKind::Pipe => "pipe",
            ResourceKind::PowerLock => "power_lock",
            ResourceKind::ExitGuard => "exit_guard",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
