//! Opt-in retry with exponential backoff.
//!
//! The protocol never retries on its own: [`RetryPolicy::none`] is the
//! default and the caller decides how persistent to be. When retries are
//! enabled, only errors for which [`Error::is_retryable`] holds are retried.
//! Denials, rejections and crypto failures surface on the first attempt.

use backon::{ExponentialBuilder, Retryable};
use std::future::Future;
use std::time::Duration;

use crate::config::{RETRY_MAX_DELAY, RETRY_MIN_DELAY};
use crate::error::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: usize,
    min_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// A single attempt.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            min_delay: RETRY_MIN_DELAY,
            max_delay: RETRY_MAX_DELAY,
        }
    }

    /// Up to `max_retries` further attempts, backing off from
    /// `RETRY_MIN_DELAY` to `RETRY_MAX_DELAY`.
    pub fn exponential(max_retries: usize) -> Self {
        Self {
            max_retries,
            ..Self::none()
        }
    }

    pub fn with_delays(mut self, min_delay: Duration, max_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self.max_delay = max_delay;
        self
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Run `attempt` until it succeeds, fails terminally, or the retry
    /// budget is spent. The last error is returned.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, attempt: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        if self.max_retries == 0 {
            let mut attempt = attempt;
            return attempt().await;
        }

        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries);

        attempt
            .retry(backoff)
            .when(|err: &Error| err.is_retryable())
            .notify(|err: &Error, delay: Duration| {
                tracing::warn!(
                    operation,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after transient failure"
                );
            })
            .await
    }
}
