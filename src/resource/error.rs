use thiserror::Error;

/// Why an acquisition did not produce a handle.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("Acquisition cancelled")]
    Cancelled,

    #[error("Resource unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error during acquisition: {0}")]
    Io(#[from] std::io::Error),

    #[error("Gave up after {attempts} failed attempts: {last}")]
    RetryExhausted { attempts: u32, last: String },
}

/// Failure while releasing an acquired handle.
#[derive(Debug, Error)]
pub enum ReleaseError {
    /// The resource was already closed by someone else.
    #[error("Resource already closed")]
    AlreadyClosed,

    #[error("Release failed: {0}")]
    Failed(String),
}

impl ReleaseError {
    /// Races such as "already closed" count as a successful release.
    pub fn is_benign(&self) -> bool {
        matches!(self, ReleaseError::AlreadyClosed)
    }
}
