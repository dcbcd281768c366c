//! Bounded retry of transiently failing storage work.

use crate::catalog::config::SyncConfig;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry policy for the apply step of a sync.
///
/// Only failures classified as transient are retried. The delay before
/// retry `n` is `backoff * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    retries: u32,
    backoff: Duration,
}

impl RetryPolicy {
    /// Creates a policy allowing `retries` extra attempts.
    #[must_use]
    pub const fn new(retries: u32, backoff: Duration) -> Self {
        Self { retries, backoff }
    }

    /// Builds the policy from sync configuration.
    #[must_use]
    pub const fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.transient_retry_attempts, config.retry_backoff())
    }

    /// Returns the number of extra attempts.
    #[must_use]
    pub const fn retries(&self) -> u32 {
        self.retries
    }

    /// Returns the delay before retry number `retry` (starting at one).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.backoff.saturating_mul(retry)
    }

    /// Runs `operation` until it succeeds, fails permanently or exhausts
    /// the retry budget.
    ///
    /// # Errors
    ///
    /// Returns the last error produced by `operation`.
    pub async fn run<T, E, Op, Fut>(
        &self,
        mut operation: Op,
        is_transient: impl Fn(&E) -> bool,
    ) -> Result<T, E>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut retry = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if retry < self.retries && is_transient(&err) => {
                    retry += 1;
                    let delay = self.delay_for(retry);
                    warn!(
                        retry,
                        max_retries = self.retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "transient storage failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
