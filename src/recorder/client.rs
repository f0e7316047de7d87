use tokio::sync::{mpsc, oneshot, watch};

use crate::session::{Action, Snapshot};
use crate::teardown::TeardownReport;

use super::types::{RecorderCommand, RecorderError};

/// Presentation-side handle to a running recorder.
#[derive(Clone)]
pub struct RecorderHandle {
    sender: mpsc::Sender<RecorderCommand>,
    snapshots: watch::Receiver<Snapshot>,
}

impl RecorderHandle {
    pub(crate) fn new(
        sender: mpsc::Sender<RecorderCommand>,
        snapshots: watch::Receiver<Snapshot>,
    ) -> Self {
        Self { sender, snapshots }
    }

    /// Queue a user action. Actions invalid in the current state are
    /// ignored by the session, not rejected here.
    pub async fn send(&self, action: Action) -> Result<(), RecorderError> {
        self.sender
            .send(RecorderCommand::Action(action))
            .await
            .map_err(|_| RecorderError::Closed)
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    /// Stop any active session, wait for outstanding teardowns and end the
    /// event loop.
    pub async fn shutdown(&self) -> Result<Vec<TeardownReport>, RecorderError> {
        let (respond_to, receiver) = oneshot::channel();
        self.sender
            .send(RecorderCommand::Shutdown { respond_to })
            .await
            .map_err(|_| RecorderError::Closed)?;

        receiver.await.map_err(|_| RecorderError::Closed)
    }
}
