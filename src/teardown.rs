//! Teardown coordinator.
//!
//! Runs once per session cycle, whatever ended it. Stops the pipe first
//! (the sink gets a grace period to finish an in-flight write), then
//! cancels every actor of the cycle: actors that reached `Ready` release their
//! handle, actors still acquiring release as soon as their acquisition
//! settles. Failures are logged and counted, never raised.

use std::time::Duration;

use futures_util::future::join_all;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::pipe::{PipeEnd, PipeHandle};
use crate::resource::{ActorHandle, ActorOutcome};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Handles that reached `Ready` and were released.
    pub released: usize,
    /// Actors that never produced a handle.
    pub not_acquired: usize,
    /// Releases that failed (logged).
    pub failed: usize,
    pub pipe: Option<PipeEnd>,
}

pub struct Teardown {
    pub session: Uuid,
    pub pipe: Option<PipeHandle>,
    pub actors: Vec<ActorHandle>,
    pub grace: Duration,
}

impl Teardown {
    pub fn spawn(self) -> JoinHandle<TeardownReport> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) -> TeardownReport {
        let session = self.session;
        let mut report = TeardownReport::default();

        if let Some(pipe) = self.pipe {
            let outcome = pipe.shutdown(self.grace).await;
            tracing::debug!(%session, end = ?outcome.end, chunks = outcome.chunks, bytes = outcome.bytes, "Pipe shut down");
            report.pipe = Some(outcome.end);
        }

        let outcomes = join_all(self.actors.into_iter().map(ActorHandle::stop)).await;
        for outcome in outcomes {
            match outcome {
                ActorOutcome::Released => report.released += 1,
                ActorOutcome::NotAcquired => report.not_acquired += 1,
                ActorOutcome::ReleaseFailed | ActorOutcome::Panicked => report.failed += 1,
            }
        }

        if report.failed > 0 {
            tracing::warn!(%session, failed = report.failed, released = report.released, "Teardown finished with release failures");
        } else {
            tracing::info!(%session, released = report.released, not_acquired = report.not_acquired, "Teardown complete");
        }
        report
    }
}
