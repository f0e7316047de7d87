use std::time::Duration;

/// Default growth factor between retry timeouts.
pub const GOLDEN_RATIO: f64 = 1.618_033_988_749_895;

/// How often and how patiently to retry an acquisition.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Wait after the first failure.
    pub initial_timeout: Duration,
    /// Factor applied to the wait after every failure. Must be > 1.
    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Start a fresh acquisition cycle.
    pub fn backoff(&self) -> Backoff {
        Backoff {
            max_attempts: self.max_attempts,
            multiplier: self.multiplier,
            failures: 0,
            timeout: self.initial_timeout,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            initial_timeout: Duration::from_millis(1000),
            multiplier: GOLDEN_RATIO,
        }
    }
}

/// Attempt bookkeeping for one acquisition cycle.
///
/// Never reset mid-cycle; a new cycle gets a new `Backoff`.
#[derive(Debug, Clone)]
pub struct Backoff {
    max_attempts: Option<u32>,
    multiplier: f64,
    failures: u32,
    timeout: Duration,
}

impl Backoff {
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Record a failed attempt.
    ///
    /// Returns the wait before the next attempt (`T0 * r^i` after the i-th
    /// failure, counting from zero), or `None` once the budget is spent.
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);
        if let Some(max) = self.max_attempts {
            if self.failures >= max {
                return None;
            }
        }

        let wait = self.timeout;
        self.timeout = Duration::try_from_secs_f64(self.timeout.as_secs_f64() * self.multiplier)
            .unwrap_or(Duration::MAX);
        Some(wait)
    }
}
