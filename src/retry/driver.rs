use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::resource::{AcquireError, ReleaseError, Resource, ResourceKind};
use crate::session::SessionError;

use super::policy::RetryPolicy;
use super::signal::ReadinessSignal;

/// Why the retry loop stopped without a lease.
#[derive(Debug, Error)]
pub enum RetryError {
    #[error("Retry cancelled")]
    Cancelled,

    #[error("Retries exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl From<RetryError> for AcquireError {
    fn from(err: RetryError) -> Self {
        match err {
            RetryError::Cancelled => AcquireError::Cancelled,
            RetryError::Exhausted { attempts, last } => {
                AcquireError::RetryExhausted { attempts, last }
            }
        }
    }
}

/// A resource whose acquisition fails transiently and whose live lease may
/// later be lost.
#[async_trait]
pub trait FlakyResource: Send + Sync + 'static {
    type Input: Send + Sync + 'static;
    type Lease: Send + 'static;

    fn kind(&self) -> ResourceKind;

    /// One acquisition attempt.
    async fn attempt(&self, input: &Self::Input) -> Result<Self::Lease, AcquireError>;

    /// Resolves once `lease` has been lost. Must be cancel safe.
    async fn lost(&self, lease: &mut Self::Lease);

    async fn release(&self, lease: Self::Lease) -> Result<(), ReleaseError>;
}

/// Run `attempt` until it succeeds, the policy's budget is spent, or
/// `cancel` fires.
///
/// Between attempts the loop waits for `signal` or the current timeout,
/// whichever comes first. The attempt itself is never timed out or
/// interrupted, so a success may be returned even though `cancel` fired
/// while it was in flight; callers own that lease and must release it.
pub async fn retry_acquire<T, F, Fut>(
    kind: ResourceKind,
    policy: &RetryPolicy,
    signal: &dyn ReadinessSignal,
    cancel: &CancellationToken,
    mut attempt: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AcquireError>>,
{
    let mut backoff = policy.backoff();
    loop {
        let err = match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        tracing::warn!(
            resource = %kind,
            attempt = backoff.failures() + 1,
            error = %err,
            "Acquisition attempt failed"
        );

        let Some(wait) = backoff.record_failure() else {
            return Err(RetryError::Exhausted {
                attempts: backoff.failures(),
                last: err.to_string(),
            });
        };

        tokio::select! {
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            _ = signal.ready() => tracing::debug!(resource = %kind, "Readiness signalled, retrying"),
            _ = tokio::time::sleep(wait) => tracing::debug!(resource = %kind, ?wait, "Retry timeout elapsed"),
        }
    }
}

/// Wraps a [`FlakyResource`] as a [`Resource`]: acquisition retries with
/// backoff, and a lost lease is reacquired in the background without the
/// session noticing.
pub struct RetryDriver<F: FlakyResource> {
    inner: Arc<F>,
    policy: RetryPolicy,
    signal: Arc<dyn ReadinessSignal>,
}

impl<F: FlakyResource> RetryDriver<F> {
    pub fn new(inner: F, policy: RetryPolicy, signal: Arc<dyn ReadinessSignal>) -> Self {
        Self::shared(Arc::new(inner), policy, signal)
    }

    /// Like [`RetryDriver::new`] for a backend the caller keeps a handle to.
    pub fn shared(inner: Arc<F>, policy: RetryPolicy, signal: Arc<dyn ReadinessSignal>) -> Self {
        Self {
            inner,
            policy,
            signal,
        }
    }
}

/// Live binding to a retried resource.
///
/// Clones share the same binding; the lease underneath may be swapped by
/// background reacquisition.
#[derive(Clone)]
pub struct LeaseHandle {
    stop: CancellationToken,
    held: Arc<AtomicBool>,
    rebinds: Arc<AtomicU32>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl LeaseHandle {
    /// Whether a lease is currently bound.
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }

    /// Number of transparent reacquisitions so far.
    pub fn rebinds(&self) -> u32 {
        self.rebinds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<F: FlakyResource> Resource for RetryDriver<F> {
    type Input = F::Input;
    type Handle = LeaseHandle;

    fn kind(&self) -> ResourceKind {
        self.inner.kind()
    }

    async fn acquire(
        &self,
        input: F::Input,
        cancel: CancellationToken,
    ) -> Result<LeaseHandle, AcquireError> {
        let kind = self.inner.kind();
        let lease = {
            let inner = &*self.inner;
            let input = &input;
            retry_acquire(kind, &self.policy, &*self.signal, &cancel, move || {
                inner.attempt(input)
            })
            .await?
        };

        let handle = LeaseHandle {
            stop: CancellationToken::new(),
            held: Arc::new(AtomicBool::new(true)),
            rebinds: Arc::new(AtomicU32::new(0)),
            task: Arc::new(Mutex::new(None)),
        };
        let task = tokio::spawn(maintain(
            Arc::clone(&self.inner),
            input,
            self.policy.clone(),
            Arc::clone(&self.signal),
            lease,
            handle.clone(),
        ));
        *handle.task.lock() = Some(task);
        Ok(handle)
    }

    async fn release(&self, handle: LeaseHandle) -> Result<(), ReleaseError> {
        // Stopping wins over any in-progress or future reacquisition.
        handle.stop.cancel();
        let task = handle.task.lock().take();
        match task {
            Some(task) => task
                .await
                .map_err(|err| ReleaseError::Failed(err.to_string())),
            None => Err(ReleaseError::AlreadyClosed),
        }
    }
}

async fn maintain<F: FlakyResource>(
    inner: Arc<F>,
    input: F::Input,
    policy: RetryPolicy,
    signal: Arc<dyn ReadinessSignal>,
    mut lease: F::Lease,
    handle: LeaseHandle,
) {
    let kind = inner.kind();
    let stop = handle.stop.clone();

    loop {
        let lost = tokio::select! {
            biased;
            _ = stop.cancelled() => false,
            _ = inner.lost(&mut lease) => true,
        };

        if !lost {
            release_lease(&*inner, lease).await;
            handle.held.store(false, Ordering::SeqCst);
            return;
        }

        handle.held.store(false, Ordering::SeqCst);
        release_lease(&*inner, lease).await;
        if stop.is_cancelled() {
            return;
        }

        tracing::warn!(
            error = %SessionError::ResourceLost { resource: kind },
            "Reacquiring"
        );
        let fresh = {
            let inner = &*inner;
            let input = &input;
            retry_acquire(kind, &policy, &*signal, &stop, move || inner.attempt(input)).await
        };

        match fresh {
            Ok(fresh) if stop.is_cancelled() => {
                release_lease(&*inner, fresh).await;
                return;
            }
            Ok(fresh) => {
                lease = fresh;
                handle.held.store(true, Ordering::SeqCst);
                let rebinds = handle.rebinds.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::info!(resource = %kind, rebinds, "Resource reacquired");
            }
            Err(RetryError::Cancelled) => return,
            Err(err) => {
                tracing::warn!(
                    resource = %kind,
                    error = %err,
                    "Reacquisition exhausted, continuing without resource"
                );
                return;
            }
        }
    }
}

async fn release_lease<F: FlakyResource>(inner: &F, lease: F::Lease) {
    match inner.release(lease).await {
        Ok(()) => tracing::debug!(resource = %inner.kind(), "Lease released"),
        Err(err) if err.is_benign() => {
            tracing::debug!(resource = %inner.kind(), error = %err, "Lease already gone")
        }
        Err(err) => tracing::warn!(resource = %inner.kind(), error = %err, "Lease release failed"),
    }
}
