//! Resource actors.
//!
//! Every fallible external resource a session depends on (capture stream,
//! output sink, power lock, exit guard) is wrapped in a [`ResourceActor`]:
//! one task per acquisition cycle that acquires in the background, reports
//! `Ready`/`Error` tagged with its correlation id, and releases exactly once
//! when cancelled.
//!
//! # Architecture
//!
//! ```text
//! Recorder ──spawn──→ ResourceActor ──acquire──→ Resource
//!    ↑                     │
//!    └──── ActorReport ────┘   (tagged with ActorId)
//! ```

mod actor;
mod error;
mod id;

pub use actor::{ActorHandle, ActorLifecycle, ActorOutcome, ActorReport, Resource, ResourceActor};
pub use error::{AcquireError, ReleaseError};
pub use id::{ActorId, Criticality, IdAllocator, ResourceKind};
