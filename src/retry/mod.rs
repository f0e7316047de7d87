//! Retry/backoff driver for resources that fail transiently and may later
//! report loss of an acquired handle.
//!
//! - `policy.rs` - attempt budget and exponential timeouts
//! - `signal.rs` - external "try again now" readiness signals
//! - `driver.rs` - the retry loop and transparent reacquisition after loss

mod driver;
mod policy;
mod signal;

pub use driver::{retry_acquire, FlakyResource, LeaseHandle, RetryDriver, RetryError};
pub use policy::{Backoff, RetryPolicy, GOLDEN_RATIO};
pub use signal::{ForegroundSignal, NeverReady, ReadinessSignal};
