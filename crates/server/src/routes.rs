//! The administrative HTTP surface `spec.md` §6 describes: submit task,
//! cancel task, query task state, list endpoint stats, trigger maintenance
//! — plus pipeline submission/query/cancel, since the orchestrator is one
//! of the seven core components and needs an external entry point too.
//! Grounded on the teacher's `orchestration::api` (Axum router shape, JSON
//! request/response structs, `Extension`/`State`-carried store handles).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use contracts::pipeline::Pipeline;
use contracts::replica::{AnalyzerKind, ReplicaStats};
use contracts::subject_application::AppIdentity;
use contracts::task::{AnalysisKind, AnalysisTask, ToolSelection};
use orchestrator::PipelineSpec;

use crate::error::ServerError;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/tasks", post(submit_task))
        .route("/tasks/:id", get(get_task))
        .route("/tasks/:id/cancel", post(cancel_task))
        .route("/pipelines", post(submit_pipeline))
        .route("/pipelines/:id", get(get_pipeline))
        .route("/pipelines/:id/cancel", post(cancel_pipeline))
        .route("/pools/:kind/stats", get(pool_stats))
        .route("/maintenance/run", post(run_maintenance))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
pub struct SubmitTaskRequest {
    pub model_identifier: String,
    pub app_number: u32,
    pub kind: AnalysisKind,
    pub tools: Vec<String>,
    #[serde(default)]
    pub configuration: serde_json::Value,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    #[serde(flatten)]
    pub task: AnalysisTask,
}

/// `POST /tasks` — validates and inserts a task in `PENDING` state; the
/// executor picks it up on its own poll loop. The `model_identifier` is
/// normalised here, at the HTTP boundary, so every downstream component
/// can assume it already is (`contracts::AppIdentity::new` documents this).
async fn submit_task(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmitTaskRequest>,
) -> Result<Json<TaskResponse>, ServerError> {
    if request.tools.is_empty() {
        return Err(ServerError::InvalidRequest("at least one tool must be selected".to_string()));
    }

    let identity = AppIdentity::new(request.model_identifier, request.app_number);
    let task = AnalysisTask::new(
        identity.model_identifier,
        identity.app_number,
        request.kind,
        ToolSelection::new(request.tools),
        request.priority,
    );
    let mut task = task;
    task.configuration = request.configuration;

    let inserted = state.tasks.insert(&task).await?;
    Ok(Json(TaskResponse { task: inserted }))
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TaskResponse>, ServerError> {
    let task = state.tasks.get(id).await?.ok_or(ServerError::NotFound("task"))?;
    Ok(Json(TaskResponse { task }))
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub task_id: Uuid,
}

/// `POST /tasks/:id/cancel` — cancelling an already-terminal task is a
/// no-op (`executor::TaskExecutor::request_cancel` and
/// `TaskStore::cancel` are both idempotent), not an error.
async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelResponse>, ServerError> {
    state.executor.request_cancel(id).await?;
    Ok(Json(CancelResponse { task_id: id }))
}

async fn submit_pipeline(
    State(state): State<Arc<AppState>>,
    Json(spec): Json<PipelineSpec>,
) -> Result<Json<Pipeline>, ServerError> {
    let pipeline = state.orchestrator.submit(spec).await?;
    Ok(Json(pipeline))
}

async fn get_pipeline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Pipeline>, ServerError> {
    let pipeline = state.pipelines.get(id).await?.ok_or(ServerError::NotFound("pipeline"))?;
    Ok(Json(pipeline))
}

async fn cancel_pipeline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelResponse>, ServerError> {
    state.orchestrator.request_cancel(id).await?;
    Ok(Json(CancelResponse { task_id: id }))
}

#[derive(Debug, Serialize)]
pub struct PoolStatsResponse {
    pub kind: AnalyzerKind,
    pub endpoints: Vec<ReplicaStats>,
    pub total_active_requests: u32,
    pub healthy_endpoint_count: usize,
}

/// `GET /pools/:kind/stats` — per-endpoint stats plus a small aggregate
/// rollup, the pool's full observability surface per `spec.md` §4.3.
async fn pool_stats(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> Result<Json<PoolStatsResponse>, ServerError> {
    let kind: AnalyzerKind = kind
        .parse()
        .map_err(|_| ServerError::InvalidRequest(format!("unknown analyzer kind {kind:?}")))?;
    let pool = state.pools.pool(kind).ok_or(ServerError::NotFound("pool"))?;

    let endpoints = pool.all_stats();
    let total_active_requests = endpoints.iter().map(|e| e.active_requests).sum();
    let healthy_endpoint_count = endpoints.iter().filter(|e| e.healthy).count();

    Ok(Json(PoolStatsResponse {
        kind,
        endpoints,
        total_active_requests,
        healthy_endpoint_count,
    }))
}

/// `POST /maintenance/run` — runs the stuck-task reaper, the result-file
/// reconciliation sweep, and the subject-application orphan sweep
/// out of band of their own periodic schedules.
async fn run_maintenance(State(state): State<Arc<AppState>>) -> Result<Json<crate::maintenance::MaintenanceReport>, ServerError> {
    let report = state.maintenance.run_once().await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_task_request_deserializes_with_defaults() {
        let json = serde_json::json!({
            "model_identifier": "gpt-4",
            "app_number": 1,
            "kind": "static",
            "tools": ["bandit"],
        });
        let request: SubmitTaskRequest = serde_json::from_value(json).unwrap();
        assert_eq!(request.priority, 0);
        assert_eq!(request.configuration, serde_json::Value::Null);
    }
}
