use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::{AcquireError, ReleaseError};
use super::id::{ActorId, ResourceKind};

/// An acquire/release pair for one fallible external resource.
///
/// `acquire` may take arbitrarily long and is never timed out by the actor.
/// Implementations should check `cancel` at their own suspension points and
/// return [`AcquireError::Cancelled`] when it fires. `release` is invoked by
/// the actor at most once per handle, and only for handles that were
/// successfully acquired.
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    type Input: Send + 'static;
    type Handle: Clone + Send + Sync + 'static;

    fn kind(&self) -> ResourceKind;

    async fn acquire(
        &self,
        input: Self::Input,
        cancel: CancellationToken,
    ) -> Result<Self::Handle, AcquireError>;

    async fn release(&self, handle: Self::Handle) -> Result<(), ReleaseError>;
}

/// Observable lifecycle of a single acquisition cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorLifecycle {
    Idle,
    Acquiring,
    Ready,
    Error,
    Cancelled,
}

/// The single report an actor emits per acquisition cycle.
#[derive(Debug)]
pub enum ActorReport<H> {
    Ready { id: ActorId, handle: H },
    Error { id: ActorId, cause: AcquireError },
}

/// How an actor finished once it was stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorOutcome {
    /// The handle reached `Ready` and was released (benign races included).
    Released,
    /// The handle reached `Ready` but releasing it failed.
    ReleaseFailed,
    /// Acquisition failed or was cancelled before producing a handle.
    NotAcquired,
    /// The actor task panicked.
    Panicked,
}

/// Spawns resource actors.
pub struct ResourceActor;

impl ResourceActor {
    /// Start acquiring `resource` in the background.
    ///
    /// `report` is called at most once, with `Ready` or `Error`, and never
    /// after the returned handle has been cancelled.
    pub fn spawn<R, F>(id: ActorId, resource: Arc<R>, input: R::Input, report: F) -> ActorHandle
    where
        R: Resource + ?Sized,
        F: FnOnce(ActorReport<R::Handle>) + Send + 'static,
    {
        let kind = resource.kind();
        let cancel = CancellationToken::new();
        let (lifecycle_tx, lifecycle_rx) = watch::channel(ActorLifecycle::Idle);
        let task = tokio::spawn(run(
            id,
            resource,
            input,
            cancel.clone(),
            lifecycle_tx,
            report,
        ));

        ActorHandle {
            id,
            kind,
            cancel,
            lifecycle: lifecycle_rx,
            task,
        }
    }
}

async fn run<R, F>(
    id: ActorId,
    resource: Arc<R>,
    input: R::Input,
    cancel: CancellationToken,
    lifecycle: watch::Sender<ActorLifecycle>,
    report: F,
) -> ActorOutcome
where
    R: Resource + ?Sized,
    F: FnOnce(ActorReport<R::Handle>),
{
    let kind = resource.kind();
    lifecycle.send_replace(ActorLifecycle::Acquiring);
    tracing::debug!(%id, resource = %kind, "Acquiring");

    let handle = match resource.acquire(input, cancel.clone()).await {
        Ok(handle) => handle,
        Err(cause) => {
            if cancel.is_cancelled() {
                lifecycle.send_replace(ActorLifecycle::Cancelled);
                tracing::debug!(%id, resource = %kind, error = %cause, "Acquisition settled after cancellation");
            } else {
                lifecycle.send_replace(ActorLifecycle::Error);
                tracing::debug!(%id, resource = %kind, error = %cause, "Acquisition failed");
                report(ActorReport::Error { id, cause });
            }
            return ActorOutcome::NotAcquired;
        }
    };

    if cancel.is_cancelled() {
        // Settled successfully after cancel: release now so nothing leaks.
        tracing::debug!(%id, resource = %kind, "Acquired after cancellation, releasing");
        let outcome = release(&*resource, id, handle).await;
        lifecycle.send_replace(ActorLifecycle::Cancelled);
        return outcome;
    }

    lifecycle.send_replace(ActorLifecycle::Ready);
    tracing::debug!(%id, resource = %kind, "Ready");
    report(ActorReport::Ready {
        id,
        handle: handle.clone(),
    });

    cancel.cancelled().await;
    let outcome = release(&*resource, id, handle).await;
    lifecycle.send_replace(ActorLifecycle::Cancelled);
    outcome
}

async fn release<R>(resource: &R, id: ActorId, handle: R::Handle) -> ActorOutcome
where
    R: Resource + ?Sized,
{
    let kind = resource.kind();
    match resource.release(handle).await {
        Ok(()) => {
            tracing::debug!(%id, resource = %kind, "Released");
            ActorOutcome::Released
        }
        Err(err) if err.is_benign() => {
            tracing::debug!(%id, resource = %kind, error = %err, "Released (benign)");
            ActorOutcome::Released
        }
        Err(err) => {
            tracing::warn!(%id, resource = %kind, error = %err, "Release failed");
            ActorOutcome::ReleaseFailed
        }
    }
}

/// Owner-side handle of a running actor.
pub struct ActorHandle {
    id: ActorId,
    kind: ResourceKind,
    cancel: CancellationToken,
    lifecycle: watch::Receiver<ActorLifecycle>,
    task: JoinHandle<ActorOutcome>,
}

impl ActorHandle {
    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn lifecycle(&self) -> ActorLifecycle {
        *self.lifecycle.borrow()
    }

    /// Request cancellation. Idempotent; the signal is permanent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel and wait until the actor is done.
    ///
    /// Resolves only after an in-flight acquisition has settled and, if it
    /// produced a handle, that handle has been released.
    pub async fn stop(self) -> ActorOutcome {
        self.cancel.cancel();
        match self.task.await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(id = %self.id, resource = %self.kind, error = %err, "Actor task failed");
                ActorOutcome::Panicked
            }
        }
    }
}
