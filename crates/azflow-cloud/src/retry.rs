//! Retry policy for cloud operations

use crate::error::{CloudError, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Retry configuration for provider operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Number of retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Upper bound for the delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier (1.0 keeps the delay constant)
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Fixed delay between retries
    pub fn constant(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
        }
    }

    /// Delay before retry number `retry` (0-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(retry as i32);
        self.initial_delay.mul_f64(factor).min(self.max_delay)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the retries are exhausted
    pub async fn run<T, F, Fut, R>(
        &self,
        cancel: &CancellationToken,
        retryable: R,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        R: Fn(&CloudError) -> bool,
    {
        let mut retry = 0;
        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if retry >= self.max_retries || !retryable(&err) {
                return Err(err);
            }

            let delay = self.delay_for(retry);
            tracing::debug!(retry = retry + 1, ?delay, error = %err, "Retrying operation");
            tokio::select! {
                _ = cancel.cancelled() => return Err(CloudError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            retry += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_for() {
        let backoff = RetryConfig::default();
        assert_eq!(backoff.delay_for(0), Duration::from_secs(1));
        assert_eq!(backoff.delay_for(2), Duration::from_secs(4));
        assert_eq!(backoff.delay_for(10), Duration::from_secs(30));

        let constant = RetryConfig::constant(3, Duration::from_secs(20));
        assert_eq!(constant.delay_for(0), Duration::from_secs(20));
        assert_eq!(constant.delay_for(2), Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let config = RetryConfig::constant(3, Duration::from_millis(1));
        let cancel = CancellationToken::new();

        let result = config
            .run(&cancel, CloudError::is_not_found, || async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(CloudError::NotFound("registry".into()))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let config = RetryConfig::constant(3, Duration::from_millis(1));
        let cancel = CancellationToken::new();

        let result: Result<()> = config
            .run(&cancel, CloudError::is_not_found, || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(CloudError::NotFound("registry".into()))
            })
            .await;

        assert!(result.is_err());
        // first attempt plus three retries
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_immediately() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let config = RetryConfig::constant(3, Duration::from_millis(1));
        let cancel = CancellationToken::new();

        let result: Result<()> = config
            .run(&cancel, CloudError::is_not_found, || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(CloudError::InvalidConfig("bad".into()))
            })
            .await;

        assert!(matches!(result, Err(CloudError::InvalidConfig(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
