//! Recorder runtime: drives the session machine against live resources.
//!
//! ```text
//! RecorderHandle ──actions──→ Recorder loop ──effects──→ actors / pipe / teardown
//!        ↑                        ↑   │
//!        └──── watch<Snapshot> ───┘   └── reports (Ready/Error/PipeDone) ──┐
//!                                 ↑                                        │
//!                                 └────────────────────────────────────────┘
//! ```

mod client;
mod runtime;
mod types;

pub use client::RecorderHandle;
pub use runtime::Recorder;
pub use types::{
    CaptureProvider, ExitGuardResource, PowerLockProvider, Providers, RecorderError,
    RecorderSettings, SinkProvider,
};
