//! Session-scoped recording orchestrator.
//!
//! A record action acquires a capture and a sink in parallel, streams
//! chunks between them once both are ready, holds best-effort side
//! resources (power lock, exit guard) while active, and tears everything
//! down exactly once when the session ends.

pub mod capture;
pub mod cli;
pub mod config;
pub mod guard;
pub mod logging;
pub mod pipe;
pub mod power;
pub mod recorder;
pub mod resource;
pub mod retry;
pub mod session;
pub mod shutdown;
pub mod sink;
pub mod teardown;
