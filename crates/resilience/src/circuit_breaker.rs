//! Circuit breaker: trips after repeated failures against a dependency and
//! rejects calls for a cooldown period before probing recovery.
//!
//! States:
//! - Closed: normal operation
//! - Open: rejecting calls
//! - HalfOpen: probing whether the dependency has recovered

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
#[error("circuit breaker '{circuit_name}' is open: {message}")]
pub struct CircuitBreakerOpenError {
    pub message: String,
    pub circuit_name: String,
    pub stats: CircuitBreakerStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub name: String,
    /// Consecutive failures before opening.
    pub failure_threshold: u64,
    /// Consecutive successes while half-open before closing.
    pub success_threshold: u64,
    /// How long to wait in `Open` before trying a half-open probe.
    pub reset_timeout_ms: u64,
}

impl CircuitBreakerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub failure_count: u64,
    pub success_count: u64,
    pub total_requests: u64,
    pub last_failure: Option<SystemTime>,
    pub last_success: Option<SystemTime>,
}

/// Per-endpoint (or per-dependency) failure tracker. One instance guards one
/// call site; callers that need per-target isolation (e.g. the analyzer pool
/// guarding each replica independently) hold one breaker per target key.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: AtomicU8,
    failure_count: AtomicU64,
    success_count: AtomicU64,
    total_requests: AtomicU64,
    next_attempt: Arc<RwLock<Instant>>,
    last_failure: Arc<RwLock<Option<SystemTime>>>,
    last_success: Arc<RwLock<Option<SystemTime>>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            next_attempt: Arc::new(RwLock::new(Instant::now())),
            last_failure: Arc::new(RwLock::new(None)),
            last_success: Arc::new(RwLock::new(None)),
            state: AtomicU8::new(0),
            failure_count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            total_requests: AtomicU64::new(0),
            config,
        }
    }

    /// Returns `Err(CircuitBreakerOpenError)` without calling `operation` if
    /// the circuit is open and the cooldown hasn't elapsed yet.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        if self.get_state() == CircuitState::Open {
            let next_attempt = *self.next_attempt.read().await;
            if Instant::now() < next_attempt {
                return Err(CallError::Open(CircuitBreakerOpenError {
                    message: format!(
                        "next probe attempt in {}ms",
                        next_attempt.saturating_duration_since(Instant::now()).as_millis()
                    ),
                    circuit_name: self.config.name.clone(),
                    stats: self.get_stats().await,
                }));
            }
            self.state.store(2, Ordering::Relaxed);
            self.success_count.store(0, Ordering::Relaxed);
        }

        match operation().await {
            Ok(value) => {
                self.on_success().await;
                Ok(value)
            }
            Err(error) => {
                self.on_failure().await;
                Err(CallError::Rejected(error))
            }
        }
    }

    async fn on_success(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
        *self.last_success.write().await = Some(SystemTime::now());

        if self.get_state() == CircuitState::HalfOpen {
            let success_count = self.success_count.fetch_add(1, Ordering::Relaxed) + 1;
            if success_count >= self.config.success_threshold {
                self.state.store(0, Ordering::Relaxed);
                self.success_count.store(0, Ordering::Relaxed);
                info!(circuit = %self.config.name, successes = success_count, "circuit closed");
            }
        }
    }

    async fn on_failure(&self) {
        let failure_count = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        *self.last_failure.write().await = Some(SystemTime::now());

        if self.get_state() == CircuitState::HalfOpen || failure_count >= self.config.failure_threshold {
            self.state.store(1, Ordering::Relaxed);
            let next_attempt = Instant::now() + Duration::from_millis(self.config.reset_timeout_ms);
            *self.next_attempt.write().await = next_attempt;
            self.success_count.store(0, Ordering::Relaxed);
            warn!(circuit = %self.config.name, failures = failure_count, "circuit opened");
        }
    }

    pub fn get_state(&self) -> CircuitState {
        match self.state.load(Ordering::Relaxed) {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            _ => CircuitState::HalfOpen,
        }
    }

    /// Current consecutive-failure count, synchronously — unlike
    /// `get_stats`, callers building a per-endpoint stats snapshot (the
    /// analyzer pool's `endpoint_to_stats`) don't need to `.await` a lock
    /// just to report this one already-atomic counter.
    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub async fn get_stats(&self) -> CircuitBreakerStats {
        CircuitBreakerStats {
            state: self.get_state(),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            success_count: self.success_count.load(Ordering::Relaxed),
            total_requests: self.total_requests.load(Ordering::Relaxed),
            last_failure: *self.last_failure.read().await,
            last_success: *self.last_success.read().await,
        }
    }

    pub async fn reset(&self) {
        self.state.store(0, Ordering::Relaxed);
        self.failure_count.store(0, Ordering::Relaxed);
        self.success_count.store(0, Ordering::Relaxed);
        *self.last_failure.write().await = None;
        *self.last_success.write().await = None;
    }

    pub async fn force_open(&self, cooldown_ms: Option<u64>) {
        self.state.store(1, Ordering::Relaxed);
        let cooldown = cooldown_ms.unwrap_or(self.config.reset_timeout_ms);
        *self.next_attempt.write().await = Instant::now() + Duration::from_millis(cooldown);
        warn!(circuit = %self.config.name, "circuit forced open");
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.config.name)
            .field("state", &self.get_state())
            .field("failure_count", &self.failure_count.load(Ordering::Relaxed))
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CallError<E> {
    #[error(transparent)]
    Open(CircuitBreakerOpenError),
    #[error(transparent)]
    Rejected(E),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_closed() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig::new("test"));
        assert_eq!(cb.get_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn opens_after_failure_threshold() {
        let config = CircuitBreakerConfig {
            failure_threshold: 2,
            ..CircuitBreakerConfig::new("test")
        };
        let cb = CircuitBreaker::new(config);

        let _ = cb.call(|| async { Err::<(), &str>("boom") }).await;
        assert_eq!(cb.get_state(), CircuitState::Closed);
        let _ = cb.call(|| async { Err::<(), &str>("boom") }).await;
        assert_eq!(cb.get_state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn open_circuit_rejects_without_calling() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig::new("test"));
        cb.force_open(Some(60_000)).await;

        let mut called = false;
        let result = cb
            .call(|| {
                called = true;
                async { Ok::<_, &str>(1) }
            })
            .await;

        assert!(!called);
        assert!(matches!(result, Err(CallError::Open(_))));
    }

    #[tokio::test]
    async fn half_open_success_closes_circuit() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 1,
            reset_timeout_ms: 1,
            ..CircuitBreakerConfig::new("test")
        };
        let cb = CircuitBreaker::new(config);
        let _ = cb.call(|| async { Err::<(), &str>("boom") }).await;
        assert_eq!(cb.get_state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(5)).await;
        let result = cb.call(|| async { Ok::<_, &str>(1) }).await;
        assert!(result.is_ok());
        assert_eq!(cb.get_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn reset_restores_closed_state() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig::new("test"));
        cb.force_open(Some(60_000)).await;
        cb.reset().await;
        assert_eq!(cb.get_state(), CircuitState::Closed);
    }
}
