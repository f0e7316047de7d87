use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;

/// External hint that a failed acquisition is worth retrying right away,
/// e.g. the environment came back to the foreground.
#[async_trait]
pub trait ReadinessSignal: Send + Sync {
    async fn ready(&self);
}

/// Readiness signal that something outside the driver can trigger.
#[derive(Debug, Clone, Default)]
pub struct ForegroundSignal {
    notify: Arc<Notify>,
}

impl ForegroundSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake every driver currently waiting between attempts.
    pub fn notify_foreground(&self) {
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl ReadinessSignal for ForegroundSignal {
    async fn ready(&self) {
        self.notify.notified().await;
    }
}

/// Never fires; the driver always waits out the full timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverReady;

#[async_trait]
impl ReadinessSignal for NeverReady {
    async fn ready(&self) {
        std::future::pending::<()>().await;
    }
}
