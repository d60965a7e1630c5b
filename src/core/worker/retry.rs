//! Bounded retry with exponential backoff

use crate::config::RetryConfig;
use crate::domain::Result;
use crate::log_retry_attempt;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.base_delay_ms))
    }

    /// Pause after failed attempt `attempt` (1-based): `base * 2^(attempt - 1)`
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    /// Runs `operation` until it succeeds or the attempts are used up
    ///
    /// # Returns
    ///
    /// The first success, or the error of the last attempt.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.max_attempts => return Err(e),
                Err(e) => {
                    log_retry_attempt!(attempt, self.max_attempts, e);
                    tokio::time::sleep(self.delay(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TidewaterError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::new(5, Duration::from_millis(2000));
        assert_eq!(policy.delay(1), Duration::from_millis(2000));
        assert_eq!(policy.delay(2), Duration::from_millis(4000));
        assert_eq!(policy.delay(4), Duration::from_millis(16000));
    }

    #[tokio::test]
    async fn test_first_pause_is_base_delay() {
        let policy = RetryPolicy::new(2, Duration::from_millis(100));
        let started = std::time::Instant::now();
        policy
            .run(|attempt| async move {
                if attempt == 1 {
                    Err(TidewaterError::Source("flaky".to_string()))
                } else {
                    Ok(())
                }
            })
            .await
            .unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        // a doubled first pause would be 200ms
        assert!(elapsed < Duration::from_millis(200), "paused {elapsed:?}");
    }

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let value = policy
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(TidewaterError::Source("flaky".to_string()))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_with_last_error() {
        let policy = RetryPolicy::new(2, Duration::ZERO);
        let err = policy
            .run(|attempt| async move {
                Err::<(), _>(TidewaterError::Source(format!("failure {attempt}")))
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Source error: failure 2");
    }
}
