//! Dispatches one analyzer-kind subtask of a task to its pool and turns
//! the wire response into either a normalised [`ServiceResult`] or a
//! classified failure the completion phase can act on.

use std::time::Duration;

use contracts::replica::AnalyzerKind;
use contracts::task::{AnalysisTask, SubtaskOutcome, TaskState};
use database::ServiceResult;

use analyzer_pool::pool::{AnalyzerPool, PoolError};
use analyzer_pool::protocol::{AnalysisRequest, ResponseFrame, WireErrorClass};
use normalizer::registry::ToolOutcome;

/// Outcome of dispatching one analyzer kind. `Transient` is split out from
/// `SubtaskFailed` because the two drive different task-level behaviour:
/// a transient dispatch failure on a single-kind task retries the whole
/// task, while a subtask failure on a multi-kind task is absorbed into
/// `PARTIAL_SUCCESS` without re-running siblings that already finished.
pub enum DispatchOutcome {
    Success(ServiceResult),
    SubtaskFailed(SubtaskOutcome),
    Transient(String),
    Cancelled,
}

pub async fn dispatch_kind(
    pool: &AnalyzerPool,
    transport: &dyn analyzer_pool::pool::ReplicaTransport,
    task: &AnalysisTask,
    kind: AnalyzerKind,
    source_path: String,
    timeout: Duration,
    cancel: &tokio_util::sync::CancellationToken,
) -> DispatchOutcome {
    let request = AnalysisRequest {
        request_id: uuid::Uuid::new_v4(),
        kind,
        task_id: task.id,
        app_identifier: format!("{}/app{}", task.app_model_identifier, task.app_number),
        source_path,
        tool_selection: task.tool_selection.clone(),
        configuration: task.configuration.clone(),
        timeout_seconds: timeout.as_secs(),
    };

    let submit = tokio::select! {
        biased;
        _ = cancel.cancelled() => return DispatchOutcome::Cancelled,
        result = tokio::time::timeout(timeout, pool.submit(transport, request)) => result,
    };

    let frame = match submit {
        Err(_elapsed) => {
            return DispatchOutcome::SubtaskFailed(SubtaskOutcome {
                kind,
                state: TaskState::Failed,
                failure_reason: Some("timeout".to_string()),
            })
        }
        Ok(Err(pool_error)) => return classify_pool_error(kind, pool_error),
        Ok(Ok(frame)) => frame,
    };

    match frame {
        ResponseFrame::Result { payload, .. } => {
            let all_failed = !payload.tools.is_empty()
                && payload
                    .tools
                    .values()
                    .all(|outcome| matches!(outcome.record.status, contracts::task::ToolStatus::Failed));

            if all_failed {
                return DispatchOutcome::SubtaskFailed(SubtaskOutcome {
                    kind,
                    state: TaskState::Failed,
                    failure_reason: Some("all tools failed".to_string()),
                });
            }

            let tools = payload
                .tools
                .into_iter()
                .map(|(tool, outcome)| {
                    (
                        tool,
                        ToolOutcome {
                            record: outcome.record,
                            findings: outcome.findings,
                            sarif: outcome.sarif,
                        },
                    )
                })
                .collect();

            DispatchOutcome::Success(ServiceResult { kind, tools })
        }
        ResponseFrame::Error { class, message, .. } => match class {
            WireErrorClass::Transient => DispatchOutcome::Transient(message),
            WireErrorClass::Health => DispatchOutcome::SubtaskFailed(SubtaskOutcome {
                kind,
                state: TaskState::Failed,
                failure_reason: Some("health_timeout".to_string()),
            }),
            WireErrorClass::Timeout => DispatchOutcome::SubtaskFailed(SubtaskOutcome {
                kind,
                state: TaskState::Failed,
                failure_reason: Some("timeout".to_string()),
            }),
            WireErrorClass::Validation | WireErrorClass::Tool | WireErrorClass::Fatal => {
                DispatchOutcome::SubtaskFailed(SubtaskOutcome {
                    kind,
                    state: TaskState::Failed,
                    failure_reason: Some(message),
                })
            }
        },
        ResponseFrame::Cancelled { .. } => DispatchOutcome::Cancelled,
        ResponseFrame::Progress { .. } | ResponseFrame::Overload { .. } => {
            // Transports only ever hand back a terminal frame (see
            // `TcpReplicaTransport`); a non-terminal frame here means a
            // test double returned something it shouldn't have.
            DispatchOutcome::SubtaskFailed(SubtaskOutcome {
                kind,
                state: TaskState::Failed,
                failure_reason: Some("non-terminal frame surfaced from transport".to_string()),
            })
        }
    }
}

fn classify_pool_error(kind: AnalyzerKind, error: PoolError) -> DispatchOutcome {
    match error {
        PoolError::NoHealthyEndpoint(_) | PoolError::RetriesExhausted { .. } | PoolError::Transport(_) => {
            DispatchOutcome::Transient(error.to_string())
        }
        PoolError::NonTransient(reason) => DispatchOutcome::SubtaskFailed(SubtaskOutcome {
            kind,
            state: TaskState::Failed,
            failure_reason: Some(reason),
        }),
    }
}
