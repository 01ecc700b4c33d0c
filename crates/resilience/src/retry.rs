//! Retry with exponential backoff and jitter, behind a pluggable policy so
//! callers can decide per error whether another attempt is worthwhile.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// 0.0 disables jitter; higher values subtract a larger random slice
    /// from the computed delay.
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("giving up after {attempts} attempts: {source}")]
    AttemptsExhausted { attempts: u32, source: E },
    #[error("retry aborted: {reason}")]
    Aborted { reason: String },
}

/// Decides, per failed attempt, whether a retry is worthwhile. Separate from
/// [`RetryConfig`] so transient-vs-fatal classification can depend on the
/// concrete error type (e.g. a non-2xx vs. a connection reset) rather than
/// just attempt count.
pub trait RetryPolicy<E>: Send + Sync {
    fn should_retry(&self, attempt: u32, error: &E) -> bool;
}

pub struct MaxAttemptsPolicy {
    max_attempts: u32,
}

impl MaxAttemptsPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }
}

impl<E> RetryPolicy<E> for MaxAttemptsPolicy {
    fn should_retry(&self, attempt: u32, _error: &E) -> bool {
        attempt < self.max_attempts
    }
}

pub struct RetryExecutor<E> {
    config: RetryConfig,
    policy: Box<dyn RetryPolicy<E>>,
}

impl<E> RetryExecutor<E> {
    pub fn new(config: RetryConfig, policy: Box<dyn RetryPolicy<E>>) -> Self {
        Self { config, policy }
    }

    pub fn with_default_policy(config: RetryConfig) -> Self {
        let policy = Box::new(MaxAttemptsPolicy::new(config.max_attempts));
        Self::new(config, policy)
    }

    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        let mut total_delay_ms = 0u64;

        loop {
            attempt += 1;
            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        info!(attempt, total_delay_ms, "operation succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(error) => {
                    if !self.policy.should_retry(attempt, &error) {
                        error!(attempt, total_delay_ms, %error, "retry policy declined further attempts");
                        return Err(RetryError::AttemptsExhausted {
                            attempts: attempt,
                            source: error,
                        });
                    }

                    let delay_ms = self.calculate_delay(attempt);
                    total_delay_ms += delay_ms;
                    warn!(attempt, delay_ms, %error, "attempt failed, retrying");
                    sleep(Duration::from_millis(delay_ms)).await;
                }
            }
        }
    }

    fn calculate_delay(&self, attempt: u32) -> u64 {
        let base = self.config.initial_delay_ms as f64
            * self.config.backoff_multiplier.powi(attempt as i32 - 1);
        let mut delay_ms = (base as u64).min(self.config.max_delay_ms);

        if self.config.jitter_factor > 0.0 {
            let jitter_range = (delay_ms as f64 * self.config.jitter_factor) as u64;
            let jitter = rand::thread_rng().gen_range(0..=jitter_range.max(1));
            delay_ms = delay_ms.saturating_sub(jitter);
        }

        delay_ms
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn succeeds_first_try_without_delay() {
        let executor = RetryExecutor::with_default_policy(RetryConfig::default());
        let result = executor.execute(|| async { Ok::<_, &str>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay_ms: 1,
            ..Default::default()
        };
        let executor = RetryExecutor::with_default_policy(config);
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result = executor
            .execute(move || {
                let attempts = attempts_clone.clone();
                async move {
                    if attempts.fetch_add(1, Ordering::Relaxed) + 1 < 3 {
                        Err("transient")
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn exhausts_attempts_and_returns_last_error() {
        let config = RetryConfig {
            max_attempts: 2,
            initial_delay_ms: 1,
            ..Default::default()
        };
        let executor = RetryExecutor::with_default_policy(config);
        let result = executor.execute(|| async { Err::<(), _>("still failing") }).await;

        match result {
            Err(RetryError::AttemptsExhausted { attempts, .. }) => assert_eq!(attempts, 2),
            _ => panic!("expected exhausted error"),
        }
    }

    #[test]
    fn exponential_backoff_without_jitter() {
        let config = RetryConfig {
            initial_delay_ms: 100,
            max_delay_ms: 1_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts: 5,
        };
        let executor: RetryExecutor<&str> = RetryExecutor::with_default_policy(config);
        assert_eq!(executor.calculate_delay(1), 100);
        assert_eq!(executor.calculate_delay(2), 200);
        assert_eq!(executor.calculate_delay(3), 400);
    }

    #[test]
    fn delay_is_capped_at_max() {
        let config = RetryConfig {
            initial_delay_ms: 1_000,
            max_delay_ms: 2_000,
            backoff_multiplier: 10.0,
            jitter_factor: 0.0,
            max_attempts: 5,
        };
        let executor: RetryExecutor<&str> = RetryExecutor::with_default_policy(config);
        assert_eq!(executor.calculate_delay(3), 2_000);
    }
}
