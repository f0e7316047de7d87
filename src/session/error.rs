use thiserror::Error;

use crate::pipe::TransferError;
use crate::resource::{AcquireError, Criticality, ResourceKind};

/// Session-level error taxonomy.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A resource failed to initialize. Fatal to the session.
    #[error("Failed to acquire {resource}: {source}")]
    Acquisition {
        resource: ResourceKind,
        #[source]
        source: AcquireError,
    },

    /// The pipe failed mid-stream. Fatal to the session.
    #[error("Transfer failed: {0}")]
    Transfer(#[from] TransferError),

    /// A best-effort resource was lost mid-session.
    #[error("Lost {resource}")]
    ResourceLost { resource: ResourceKind },

    /// A best-effort resource gave up retrying.
    #[error("Gave up on {resource} after {attempts} attempts")]
    RetryExhausted { resource: ResourceKind, attempts: u32 },
}

impl SessionError {
    /// Classify an acquisition failure by the resource's criticality.
    ///
    /// Exhausted retries stay `RetryExhausted` for best-effort resources and
    /// escalate to `Acquisition` for mandatory ones.
    pub fn from_acquire(resource: ResourceKind, source: AcquireError) -> Self {
        match (resource.criticality(), source) {
            (Criticality::BestEffort, AcquireError::RetryExhausted { attempts, .. }) => {
                SessionError::RetryExhausted { resource, attempts }
            }
            (_, source) => SessionError::Acquisition { resource, source },
        }
    }
}
