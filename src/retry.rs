use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio_retry::RetryIf;

use crate::transport::TransportError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_MAX_BACKOFF_UNITS: u32 = 6;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: TransportError },

    #[error("not retried: {last}")]
    Rejected { attempts: u32, last: TransportError },
}

impl RetryError {
    pub fn last_error(&self) -> &TransportError {
        match self {
            RetryError::Exhausted { last, .. } | RetryError::Rejected { last, .. } => last,
        }
    }
}

/// Bounded exponential backoff for transport calls.
///
/// The wait before attempt `n` is `min(2^(n-1), max_backoff_units)` units; with
/// the default one-second unit that is 2 s, 4 s, then 6 s for every later try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    max_backoff_units: u32,
    unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            max_backoff_units: DEFAULT_MAX_BACKOFF_UNITS,
            unit: Duration::from_secs(1),
        }
    }

    pub fn with_unit(mut self, unit: Duration) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_max_backoff_units(mut self, units: u32) -> Self {
        self.max_backoff_units = units.max(1);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the 1-based `attempt`. The first attempt never waits.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let units = 2u32.saturating_pow(attempt - 1).min(self.max_backoff_units);
        self.unit * units
    }

    /// Waits between consecutive attempts, in order.
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + use<> {
        let policy = *self;
        (2..=policy.max_attempts).map(move |attempt| policy.delay_before(attempt))
    }

    /// Run `operation` until it succeeds, fails with a non-transient error, or
    /// the attempt budget is spent. Never panics on exhaustion.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let attempts = AtomicU32::new(0);
        let max_attempts = self.max_attempts;

        let action = || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt > 1 {
                tracing::info!("Retrying {} (attempt {}/{})", label, attempt, max_attempts);
            } else {
                tracing::debug!("{} (attempt 1/{})", label, max_attempts);
            }
            operation()
        };

        let condition = |err: &TransportError| {
            let transient = err.is_transient();
            let attempt = attempts.load(Ordering::SeqCst);
            if !transient {
                tracing::warn!("{} failed with {}, not retrying", label, err);
            } else if attempt < max_attempts {
                tracing::warn!("{} failed on attempt {}: {}", label, attempt, err);
                metrics::counter!("cita_retries_total", "reason" => err.kind()).increment(1);
            }
            transient
        };

        RetryIf::spawn(self.schedule(), action, condition)
            .await
            .map_err(|last| {
                let attempts = attempts.load(Ordering::SeqCst);
                if last.is_transient() {
                    tracing::error!("{} failed after {} attempts: {}", label, attempts, last);
                    RetryError::Exhausted { attempts, last }
                } else {
                    RetryError::Rejected { attempts, last }
                }
            })
    }
}
