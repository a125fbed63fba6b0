use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::metrics;
use crate::Result;

/// Bounded exponential backoff, applied to throttling failures only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub async fn run<T, F, Fut>(&self, resource: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Err(err) if err.is_throttled() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        resource,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Throttled by metrics source, backing off"
                    );
                    metrics::record_retry(resource);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DashboardError, FetchFailureKind};
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    fn failure(kind: FetchFailureKind) -> DashboardError {
        DashboardError::FetchFailure {
            batch_id: Uuid::nil(),
            kind,
            message: "boom".to_string(),
        }
    }

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_delays_double_and_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(10), Duration::from_secs(8));
        assert_eq!(policy.delay_for(40), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_retries_throttling_until_success() {
        let calls = AtomicU32::new(0);
        let result = fast()
            .run("retry-test", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(failure(FetchFailureKind::Throttled))
                } else {
                    Ok(42)
                }
            })
            .await;

        tokio_test::assert_ok!(&result);
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast()
            .run("retry-test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(failure(FetchFailureKind::Throttled))
            })
            .await;

        assert!(result.unwrap_err().is_throttled());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_other_failures_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast()
            .run("retry-test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(failure(FetchFailureKind::Auth))
            })
            .await;

        tokio_test::assert_err!(result);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
