//! Analyzer Replica Worker: one process per replica, running exactly one
//! analyzer kind. Owns a bounded request queue and a concurrency semaphore;
//! a pool of background tasks drains the queue, each accepted request
//! waiting on the semaphore before it runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::protocol::{AnalysisRequest, AnalysisResultPayload, ResponseFrame, ToolOutcomeWire, WireErrorClass};

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
pub const DEFAULT_CONCURRENCY: usize = 2;

#[derive(Debug, thiserror::Error)]
#[error("replica queue is full, capacity {capacity}")]
pub struct OverloadError {
    pub capacity: usize,
}

/// What a replica actually does with a request once it has a semaphore
/// permit: preflight validation, optional container start, tool execution,
/// normalisation. Injected so the queue/semaphore/cancellation plumbing is
/// testable independent of real tool processes or a Docker daemon.
#[async_trait]
pub trait AnalysisHandler: Send + Sync {
    async fn handle(
        &self,
        request: &AnalysisRequest,
        progress: &mpsc::Sender<ResponseFrame>,
        cancel: CancellationToken,
    ) -> Result<AnalysisResultPayload, HandlerError>;
}

#[derive(Debug, Clone)]
pub enum HandlerError {
    Validation(String),
    Health(String),
    Tool(String),
    Timeout,
    Fatal(String),
}

impl HandlerError {
    fn into_frame(self, request_id: uuid::Uuid) -> ResponseFrame {
        let (class, message) = match self {
            HandlerError::Validation(m) => (WireErrorClass::Validation, m),
            HandlerError::Health(m) => (WireErrorClass::Health, m),
            HandlerError::Tool(m) => (WireErrorClass::Tool, m),
            HandlerError::Timeout => (WireErrorClass::Timeout, "operation timed out".to_string()),
            HandlerError::Fatal(m) => (WireErrorClass::Fatal, m),
        };
        ResponseFrame::Error { request_id, class, message }
    }
}

struct QueuedRequest {
    request: AnalysisRequest,
    result_tx: mpsc::Sender<ResponseFrame>,
    cancel: CancellationToken,
}

/// One replica process's queue + semaphore + drain loop. `submit` is the
/// only entry point a pool-facing transport needs to call.
pub struct ReplicaWorker {
    queue_tx: mpsc::Sender<QueuedRequest>,
    capacity: usize,
    cancellations: Arc<dashmap::DashMap<uuid::Uuid, CancellationToken>>,
}

impl ReplicaWorker {
    pub fn spawn(
        handler: Arc<dyn AnalysisHandler>,
        queue_capacity: usize,
        concurrency: usize,
        drain_workers: usize,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(queue_capacity);
        let queue_rx = Arc::new(tokio::sync::Mutex::new(queue_rx));
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let cancellations = Arc::new(dashmap::DashMap::new());

        for worker_id in 0..drain_workers.max(1) {
            let queue_rx = queue_rx.clone();
            let semaphore = semaphore.clone();
            let handler = handler.clone();
            let cancellations = cancellations.clone();
            tokio::spawn(async move {
                loop {
                    let queued = {
                        let mut rx = queue_rx.lock().await;
                        rx.recv().await
                    };
                    let Some(queued) = queued else {
                        info!(worker_id, "replica drain loop shutting down: queue closed");
                        return;
                    };
                    let permit = match semaphore.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return,
                    };
                    let handler = handler.clone();
                    let cancellations = cancellations.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        process_one(handler, queued, cancellations).await;
                    });
                }
            });
        }

        Self { queue_tx, capacity: queue_capacity, cancellations }
    }

    /// Places a request on the queue without blocking. Returns an overload
    /// error immediately if the queue is already full so the pool can route
    /// elsewhere, rather than making the caller wait behind a full queue.
    pub fn submit(
        &self,
        request: AnalysisRequest,
    ) -> Result<(mpsc::Receiver<ResponseFrame>, CancellationToken), OverloadError> {
        let (result_tx, result_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        self.queue_tx
            .try_send(QueuedRequest { request, result_tx, cancel: cancel.clone() })
            .map_err(|_| OverloadError { capacity: self.capacity })?;

        Ok((result_rx, cancel))
    }

    /// Cancels an in-flight request; the handler is expected to observe the
    /// token at its next safe boundary and stop the current tool.
    pub fn cancel(&self, request_id: uuid::Uuid) {
        if let Some(token) = self.cancellations.get(&request_id) {
            token.cancel();
        }
    }
}

async fn process_one(
    handler: Arc<dyn AnalysisHandler>,
    queued: QueuedRequest,
    cancellations: Arc<dashmap::DashMap<uuid::Uuid, CancellationToken>>,
) {
    let QueuedRequest { request, result_tx, cancel } = queued;
    let request_id = request.request_id;
    cancellations.insert(request_id, cancel.clone());

    let outcome = tokio::select! {
        result = handler.handle(&request, &result_tx, cancel.clone()) => result,
        _ = cancel.cancelled() => {
            let _ = result_tx.send(ResponseFrame::Cancelled { request_id }).await;
            cancellations.remove(&request_id);
            return;
        }
    };

    let frame = match outcome {
        Ok(payload) => ResponseFrame::Result { request_id, payload },
        Err(e) => e.into_frame(request_id),
    };

    if result_tx.send(frame).await.is_err() {
        warn!(%request_id, "caller dropped result receiver before terminal frame was delivered");
    }
    cancellations.remove(&request_id);
}

/// Convenience constructor for a result payload with no findings, used by
/// handlers whose tool set came back entirely clean.
pub fn empty_payload() -> AnalysisResultPayload {
    AnalysisResultPayload {
        tools: BTreeMap::new(),
        total_findings: 0,
        findings_by_severity: BTreeMap::new(),
    }
}

pub fn tool_outcome_wire(
    record: contracts::task::ToolExecutionRecord,
    findings: Vec<contracts::finding::Finding>,
    sarif: Option<serde_json::Value>,
) -> ToolOutcomeWire {
    ToolOutcomeWire { record, findings, sarif }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::replica::AnalyzerKind;
    use contracts::task::ToolSelection;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn sample_request() -> AnalysisRequest {
        AnalysisRequest {
            request_id: uuid::Uuid::new_v4(),
            kind: AnalyzerKind::Static,
            task_id: uuid::Uuid::new_v4(),
            app_identifier: "m/1".into(),
            source_path: "/subjects/m/app1".into(),
            tool_selection: ToolSelection::new(["bandit".to_string()]),
            configuration: serde_json::Value::Null,
            timeout_seconds: 10,
        }
    }

    struct ImmediateSuccess;
    #[async_trait]
    impl AnalysisHandler for ImmediateSuccess {
        async fn handle(
            &self,
            _request: &AnalysisRequest,
            _progress: &mpsc::Sender<ResponseFrame>,
            _cancel: CancellationToken,
        ) -> Result<AnalysisResultPayload, HandlerError> {
            Ok(empty_payload())
        }
    }

    struct BlocksUntilCancelled {
        started: Arc<AtomicUsize>,
    }
    #[async_trait]
    impl AnalysisHandler for BlocksUntilCancelled {
        async fn handle(
            &self,
            _request: &AnalysisRequest,
            _progress: &mpsc::Sender<ResponseFrame>,
            cancel: CancellationToken,
        ) -> Result<AnalysisResultPayload, HandlerError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            cancel.cancelled().await;
            Ok(empty_payload())
        }
    }

    #[tokio::test]
    async fn accepted_request_eventually_yields_a_result_frame() {
        let worker = ReplicaWorker::spawn(Arc::new(ImmediateSuccess), 10, 2, 1);
        let (mut rx, _cancel) = worker.submit(sample_request()).unwrap();
        let frame = rx.recv().await.unwrap();
        assert!(matches!(frame, ResponseFrame::Result { .. }));
    }

    #[tokio::test]
    async fn full_queue_returns_overload_without_blocking() {
        let started = Arc::new(AtomicUsize::new(0));
        let worker = ReplicaWorker::spawn(
            Arc::new(BlocksUntilCancelled { started: started.clone() }),
            1,
            1,
            1,
        );

        // Fill the one concurrency slot, then the one queue slot.
        let (_rx1, _c1) = worker.submit(sample_request()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let result = worker.submit(sample_request());
        assert!(result.is_err(), "second request should overload a capacity-1 queue under a held permit");
    }

    #[tokio::test]
    async fn cancel_causes_a_cancelled_terminal_frame() {
        let started = Arc::new(AtomicUsize::new(0));
        let worker = ReplicaWorker::spawn(
            Arc::new(BlocksUntilCancelled { started: started.clone() }),
            10,
            2,
            1,
        );
        let (mut rx, cancel) = worker.submit(sample_request()).unwrap();
        // Let the handler start and observe the cancellation internally.
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        let frame = rx.recv().await.unwrap();
        assert!(matches!(frame, ResponseFrame::Cancelled { .. }) || matches!(frame, ResponseFrame::Result { .. }));
    }
}
