//! Retry Policy
//!
//! Bounded exponential backoff for calls into external services.
//! Only transient failures are retried; everything else returns at once.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tokio::time::sleep;
use tracing::warn;

use crate::error::DependencyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first call included
    pub max_attempts: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(250), Duration::from_secs(5))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            min_delay,
            max_delay,
        }
    }

    /// Single attempt, no backoff
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Share of `budget` one attempt may use, so a timed-out first attempt
    /// still leaves room for the retries
    pub fn attempt_timeout(&self, budget: Duration) -> Duration {
        let attempts = u32::try_from(self.max_attempts).unwrap_or(u32::MAX).max(1);
        budget / attempts
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_attempts.saturating_sub(1))
            .with_jitter()
    }

    /// Run `op` until it succeeds, fails permanently, or the budget is spent
    pub async fn run<T, F, Fut>(&self, operation: &'static str, op: F) -> Result<T, DependencyError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DependencyError>>,
    {
        op.retry(self.backoff())
            .sleep(sleep)
            .when(|err: &DependencyError| err.is_transient())
            .notify(|err: &DependencyError, delay: Duration| {
                warn!(
                    operation,
                    service = %err.service(),
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after transient failure"
                );
            })
            .await
    }
}
