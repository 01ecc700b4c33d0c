//! Analyzer Pool: one pool per analyzer kind, fronting N replica endpoints
//! with load balancing, health-check-driven circuit breaking, and
//! cross-endpoint retry on transient failure. The pool is the only thing
//! task-executor callers talk to; it never exposes individual endpoints.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use contracts::replica::{AnalyzerKind, ReplicaEndpointId, ReplicaStats};
use resilience::circuit_breaker::{CallError, CircuitBreaker, CircuitBreakerConfig, CircuitState};

use crate::protocol::{AnalysisRequest, ResponseFrame};

pub const DEFAULT_FAILURE_THRESHOLD: u64 = 3;
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5 * 60);
/// Bound on how many alternative endpoints the pool will try for one
/// logical request before giving up and escalating to the caller.
pub const DEFAULT_MAX_ENDPOINT_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// Lowest active-request count; ties broken by shortest recent average
    /// latency, then randomly.
    LeastLoaded,
    RoundRobin,
    Random,
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("no healthy endpoint available for analyzer kind {0}")]
    NoHealthyEndpoint(AnalyzerKind),
    #[error("request rejected by every endpoint after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
    #[error("request was not transient and is not eligible for retry: {0}")]
    NonTransient(String),
    #[error("endpoint transport error: {0}")]
    Transport(String),
}

/// Classification the pool uses to decide whether a failed `submit` is
/// worth retrying on a different endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transient,
    NonTransient,
}

/// Injected per-endpoint transport so the pool's selection/retry/circuit
/// logic is testable without a real network connection.
#[async_trait]
pub trait ReplicaTransport: Send + Sync {
    async fn send(&self, endpoint_url: &str, request: AnalysisRequest) -> Result<ResponseFrame, TransportError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("connection refused")]
    ConnectionRefused,
    #[error("connection reset mid-request")]
    Disconnected,
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            TransportError::ConnectionRefused | TransportError::Disconnected | TransportError::Timeout => {
                FailureKind::Transient
            }
            TransportError::Other(_) => FailureKind::NonTransient,
        }
    }
}

struct Endpoint {
    id: ReplicaEndpointId,
    url: String,
    kind: AnalyzerKind,
    active_requests: AtomicU32,
    /// Millisecond latency of the most recently completed request, used as
    /// a cheap proxy for "recent average latency" without keeping a window.
    last_latency_ms: AtomicU64,
    breaker: CircuitBreaker,
}

/// One pool per analyzer kind. Construct one per `AnalyzerKind` the process
/// needs to serve.
pub struct AnalyzerPool {
    kind: AnalyzerKind,
    endpoints: DashMap<ReplicaEndpointId, Arc<Endpoint>>,
    order: std::sync::Mutex<Vec<ReplicaEndpointId>>,
    round_robin_cursor: AtomicU64,
    policy: SelectionPolicy,
    max_retries: u32,
}

impl AnalyzerPool {
    pub fn new(kind: AnalyzerKind, policy: SelectionPolicy) -> Self {
        Self {
            kind,
            endpoints: DashMap::new(),
            order: std::sync::Mutex::new(Vec::new()),
            round_robin_cursor: AtomicU64::new(0),
            policy,
            max_retries: DEFAULT_MAX_ENDPOINT_RETRIES,
        }
    }

    pub fn add_endpoint(&self, url: impl Into<String>) -> ReplicaEndpointId {
        let id = ReplicaEndpointId::new();
        let endpoint = Arc::new(Endpoint {
            id,
            url: url.into(),
            kind: self.kind,
            active_requests: AtomicU32::new(0),
            last_latency_ms: AtomicU64::new(0),
            breaker: CircuitBreaker::new(CircuitBreakerConfig {
                name: format!("{}-{id:?}", self.kind),
                failure_threshold: DEFAULT_FAILURE_THRESHOLD,
                success_threshold: 1,
                reset_timeout_ms: DEFAULT_COOLDOWN.as_millis() as u64,
            }),
        });
        self.endpoints.insert(id, endpoint);
        self.order.lock().unwrap().push(id);
        id
    }

    pub fn remove_endpoint(&self, id: ReplicaEndpointId) {
        self.endpoints.remove(&id);
        self.order.lock().unwrap().retain(|e| *e != id);
    }

    fn healthy_candidates(&self, excluded: &[ReplicaEndpointId]) -> Vec<Arc<Endpoint>> {
        let order = self.order.lock().unwrap().clone();
        order
            .into_iter()
            .filter(|id| !excluded.contains(id))
            .filter_map(|id| self.endpoints.get(&id).map(|e| e.clone()))
            .filter(|e| e.breaker.get_state() != CircuitState::Open)
            .collect()
    }

    fn select(&self, excluded: &[ReplicaEndpointId]) -> Option<Arc<Endpoint>> {
        let candidates = self.healthy_candidates(excluded);
        if candidates.is_empty() {
            return None;
        }

        match self.policy {
            SelectionPolicy::Random => candidates.choose(&mut rand::thread_rng()).cloned(),
            SelectionPolicy::RoundRobin => {
                let cursor = self.round_robin_cursor.fetch_add(1, Ordering::Relaxed);
                candidates.get(cursor as usize % candidates.len()).cloned()
            }
            SelectionPolicy::LeastLoaded => {
                let min_active = candidates
                    .iter()
                    .map(|e| e.active_requests.load(Ordering::Relaxed))
                    .min()
                    .unwrap_or(0);
                let tied: Vec<_> = candidates
                    .iter()
                    .filter(|e| e.active_requests.load(Ordering::Relaxed) == min_active)
                    .collect();
                if tied.len() == 1 {
                    return Some(tied[0].clone());
                }
                let min_latency = tied
                    .iter()
                    .map(|e| e.last_latency_ms.load(Ordering::Relaxed))
                    .min()
                    .unwrap_or(0);
                let fastest: Vec<_> = tied
                    .into_iter()
                    .filter(|e| e.last_latency_ms.load(Ordering::Relaxed) == min_latency)
                    .collect();
                fastest.choose(&mut rand::thread_rng()).map(|e| (*e).clone())
            }
        }
    }

    /// Submits a request, retrying on an alternative healthy endpoint up to
    /// `max_retries` times on a transient failure. Non-transient failures
    /// (validation, a reported tool failure inside a result frame) are
    /// returned immediately without trying another endpoint — retrying
    /// would only reproduce the same outcome.
    pub async fn submit(
        &self,
        transport: &dyn ReplicaTransport,
        request: AnalysisRequest,
    ) -> Result<ResponseFrame, PoolError> {
        let mut excluded = Vec::new();
        let mut last_error = String::new();

        for attempt in 1..=self.max_retries {
            let Some(endpoint) = self.select(&excluded) else {
                if attempt == 1 {
                    return Err(PoolError::NoHealthyEndpoint(self.kind));
                }
                return Err(PoolError::RetriesExhausted { attempts: attempt - 1, last_error });
            };

            endpoint.active_requests.fetch_add(1, Ordering::Relaxed);
            let started = std::time::Instant::now();
            let call_result = endpoint
                .breaker
                .call(|| transport.send(&endpoint.url, request.clone()))
                .await;
            endpoint.active_requests.fetch_sub(1, Ordering::Relaxed);
            endpoint
                .last_latency_ms
                .store(started.elapsed().as_millis() as u64, Ordering::Relaxed);

            match call_result {
                Ok(ResponseFrame::Overload { .. }) => {
                    debug!(endpoint = %endpoint.url, "endpoint overloaded, trying another");
                    excluded.push(endpoint.id);
                    last_error = "endpoint overloaded".to_string();
                    continue;
                }
                Ok(frame) => return Ok(frame),
                Err(CallError::Open(_)) => {
                    excluded.push(endpoint.id);
                    last_error = "circuit open".to_string();
                    continue;
                }
                Err(CallError::Rejected(transport_error)) => {
                    last_error = transport_error.to_string();
                    match transport_error.failure_kind() {
                        FailureKind::Transient => {
                            warn!(endpoint = %endpoint.url, error = %transport_error, "transient failure, retrying elsewhere");
                            excluded.push(endpoint.id);
                            continue;
                        }
                        FailureKind::NonTransient => {
                            return Err(PoolError::NonTransient(transport_error.to_string()));
                        }
                    }
                }
            }
        }

        Err(PoolError::RetriesExhausted { attempts: self.max_retries, last_error })
    }

    pub fn endpoint_stats(&self, id: ReplicaEndpointId) -> Option<ReplicaStats> {
        self.endpoints.get(&id).map(|e| endpoint_to_stats(&e))
    }

    pub fn all_stats(&self) -> Vec<ReplicaStats> {
        self.order
            .lock()
            .unwrap()
            .iter()
            .filter_map(|id| self.endpoints.get(id).map(|e| endpoint_to_stats(&e)))
            .collect()
    }

    pub fn has_healthy_endpoint(&self) -> bool {
        !self.healthy_candidates(&[]).is_empty()
    }

    pub fn kind(&self) -> AnalyzerKind {
        self.kind
    }
}

fn endpoint_to_stats(endpoint: &Endpoint) -> ReplicaStats {
    let healthy = endpoint.breaker.get_state() != CircuitState::Open;
    // `CircuitBreaker` tracks cooldown internally; we approximate the public
    // `cooldown_until` field from "open now" since the breaker doesn't
    // expose the raw deadline outside its own module.
    let cooldown_until: Option<DateTime<Utc>> = if !healthy {
        Some(Utc::now() + chrono::Duration::from_std(DEFAULT_COOLDOWN).unwrap())
    } else {
        None
    };

    ReplicaStats {
        id: endpoint.id,
        url: endpoint.url.clone(),
        kind: endpoint.kind,
        healthy,
        active_requests: endpoint.active_requests.load(Ordering::Relaxed),
        average_latency_ms: endpoint.last_latency_ms.load(Ordering::Relaxed) as f64,
        consecutive_failures: endpoint.breaker.failure_count() as u32,
        cooldown_until,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use uuid::Uuid;

    fn sample_request() -> AnalysisRequest {
        AnalysisRequest {
            request_id: Uuid::new_v4(),
            kind: AnalyzerKind::Static,
            task_id: Uuid::new_v4(),
            app_identifier: "m/1".into(),
            source_path: "/subjects/m/app1".into(),
            tool_selection: contracts::task::ToolSelection::new([]),
            configuration: serde_json::Value::Null,
            timeout_seconds: 10,
        }
    }

    struct FailNTimesThenSucceed {
        calls_by_url: DashMap<String, AtomicUsize>,
        fail_count: usize,
    }

    #[async_trait]
    impl ReplicaTransport for FailNTimesThenSucceed {
        async fn send(&self, endpoint_url: &str, request: AnalysisRequest) -> Result<ResponseFrame, TransportError> {
            let counter = self
                .calls_by_url
                .entry(endpoint_url.to_string())
                .or_insert_with(|| AtomicUsize::new(0));
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_count {
                return Err(TransportError::ConnectionRefused);
            }
            Ok(ResponseFrame::Result {
                request_id: request.request_id,
                payload: crate::replica::empty_payload(),
            })
        }
    }

    struct FailsOnlyForUrl {
        bad_url: String,
        calls_by_url: DashMap<String, AtomicUsize>,
    }

    #[async_trait]
    impl ReplicaTransport for FailsOnlyForUrl {
        async fn send(&self, endpoint_url: &str, request: AnalysisRequest) -> Result<ResponseFrame, TransportError> {
            self.calls_by_url
                .entry(endpoint_url.to_string())
                .or_insert_with(|| AtomicUsize::new(0))
                .fetch_add(1, Ordering::SeqCst);
            if endpoint_url == self.bad_url {
                return Err(TransportError::ConnectionRefused);
            }
            Ok(ResponseFrame::Result {
                request_id: request.request_id,
                payload: crate::replica::empty_payload(),
            })
        }
    }

    #[tokio::test]
    async fn routes_to_second_endpoint_after_first_is_consistently_unhealthy() {
        let pool = AnalyzerPool::new(AnalyzerKind::Static, SelectionPolicy::LeastLoaded);
        let failing = pool.add_endpoint("http://a");

        let transport = FailsOnlyForUrl {
            bad_url: "http://a".to_string(),
            calls_by_url: DashMap::new(),
        };

        // A is the only endpoint, so three submits land on it three times
        // in a row and its breaker opens on the threshold-th failure.
        for _ in 0..3 {
            let _ = pool.submit(&transport, sample_request()).await;
        }
        let stats = pool.endpoint_stats(failing).unwrap();
        assert_eq!(stats.healthy, false);
        assert_eq!(
            stats.consecutive_failures, 3,
            "stats must report the breaker's real failure count, not a placeholder"
        );

        // Now register a healthy endpoint B and confirm the next request
        // is routed there without ever attempting the open endpoint A again.
        pool.add_endpoint("http://b");
        let before = transport.calls_by_url.get("http://a").map(|c| c.load(Ordering::SeqCst)).unwrap_or(0);
        let result = pool.submit(&transport, sample_request()).await;
        let after = transport.calls_by_url.get("http://a").map(|c| c.load(Ordering::SeqCst)).unwrap_or(0);

        assert_eq!(before, after, "open endpoint must be skipped without attempting the connection");
        assert!(result.is_ok(), "b should be selected and succeed on first attempt");
    }

    #[tokio::test]
    async fn non_transient_failure_is_not_retried_on_another_endpoint() {
        struct AlwaysValidationError;
        #[async_trait]
        impl ReplicaTransport for AlwaysValidationError {
            async fn send(&self, _url: &str, _req: AnalysisRequest) -> Result<ResponseFrame, TransportError> {
                Err(TransportError::Other("bad tool selection".into()))
            }
        }

        let pool = AnalyzerPool::new(AnalyzerKind::Static, SelectionPolicy::LeastLoaded);
        pool.add_endpoint("http://a");
        pool.add_endpoint("http://b");

        let result = pool.submit(&AlwaysValidationError, sample_request()).await;
        assert!(matches!(result, Err(PoolError::NonTransient(_))));
    }

    #[tokio::test]
    async fn no_endpoints_registered_is_reported_distinctly() {
        let pool = AnalyzerPool::new(AnalyzerKind::Dynamic, SelectionPolicy::LeastLoaded);
        struct Unreachable;
        #[async_trait]
        impl ReplicaTransport for Unreachable {
            async fn send(&self, _url: &str, _req: AnalysisRequest) -> Result<ResponseFrame, TransportError> {
                unreachable!("no endpoints to call")
            }
        }
        let result = pool.submit(&Unreachable, sample_request()).await;
        assert!(matches!(result, Err(PoolError::NoHealthyEndpoint(AnalyzerKind::Dynamic))));
    }

    #[tokio::test]
    async fn least_loaded_prefers_endpoint_with_fewer_active_requests() {
        let pool = AnalyzerPool::new(AnalyzerKind::Static, SelectionPolicy::LeastLoaded);
        let a = pool.add_endpoint("http://a");
        let _b = pool.add_endpoint("http://b");

        // Simulate endpoint a already being busy.
        pool.endpoints.get(&a).unwrap().active_requests.store(5, Ordering::Relaxed);

        let transport = FailNTimesThenSucceed { calls_by_url: DashMap::new(), fail_count: 0 };
        pool.submit(&transport, sample_request()).await.unwrap();

        assert!(transport.calls_by_url.get("http://a").is_none());
        assert!(transport.calls_by_url.get("http://b").is_some());
    }
}
