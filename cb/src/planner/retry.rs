//! Retry with exponential backoff for decomposition calls

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::PlannerConfig;
use crate::estimation::EstimationError;

/// How often, and how patiently, a failed decomposition is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&PlannerConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &PlannerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
        }
    }

    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor)
    }

    /// Run `op` until it succeeds, fails for good, or retries run out
    ///
    /// Only errors that report themselves retryable are tried again.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, EstimationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EstimationError>>,
    {
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let backoff = self.backoff(attempt);
                warn!(attempt, backoff_ms = backoff.as_millis() as u64, "run: retrying after transient error");
                tokio::time::sleep(backoff).await;
            }

            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    debug!(attempt, error = %e, "run: retryable failure");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_retries_unavailable_then_succeeds() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = fast(2)
            .run(move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(EstimationError::DecompositionUnavailable("503".into()))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = fast(2)
            .run(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(EstimationError::DecompositionUnavailable("timeout".into()))
            })
            .await;
        assert!(matches!(result, Err(EstimationError::DecompositionUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_parse_errors_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = fast(5)
            .run(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(EstimationError::DecompositionParse("not json".into()))
            })
            .await;
        assert!(matches!(result, Err(EstimationError::DecompositionParse(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_none_policy_single_attempt() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let _: Result<(), _> = RetryPolicy::none()
            .run(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(EstimationError::DecompositionUnavailable("down".into()))
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
