//! Task table operations: atomic claim, retry bookkeeping, terminal
//! transitions, and the stuck-task reaper's lookup query. Every write here
//! is a single statement so the claim in particular stays atomic without a
//! wrapping transaction the caller has to remember to open.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use contracts::task::{AnalysisTask, ResultSummary, TaskState};

use crate::models::{RowConversionError, TaskRow};
use crate::queries::task_queries;

#[derive(Debug, thiserror::Error)]
pub enum TaskStoreError {
    #[error(transparent)]
    Query(#[from] sqlx::Error),
    #[error(transparent)]
    Row(#[from] RowConversionError),
}

#[derive(Clone)]
pub struct TaskStore {
    pool: PgPool,
}

impl TaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, task: &AnalysisTask) -> Result<AnalysisTask, TaskStoreError> {
        let row = TaskRow::from_domain(task)?;
        let inserted: TaskRow = sqlx::query_as(task_queries::INSERT_TASK)
            .bind(row.id)
            .bind(row.app_model_identifier)
            .bind(row.app_number)
            .bind(row.kind)
            .bind(row.tool_selection)
            .bind(row.configuration)
            .bind(row.priority)
            .bind(row.state)
            .bind(row.parent_pipeline_id)
            .bind(row.created_at)
            .bind(row.preflight_retries)
            .bind(row.transient_retries)
            .bind(row.stuck_retries)
            .bind(row.has_result_files)
            .fetch_one(&self.pool)
            .await?;
        Ok(inserted.into_domain()?)
    }

    /// Atomically selects the highest-priority, oldest eligible `PENDING`
    /// task and transitions it to `RUNNING` in one statement. Returns
    /// `None` if nothing is claimable right now. Safe to call from many
    /// concurrent executor processes: `FOR UPDATE SKIP LOCKED` guarantees
    /// each row is claimed by at most one caller.
    pub async fn claim_next_pending(&self) -> Result<Option<AnalysisTask>, TaskStoreError> {
        let row: Option<TaskRow> = sqlx::query_as(task_queries::CLAIM_NEXT_PENDING)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.into_domain()).transpose()?)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<AnalysisTask>, TaskStoreError> {
        let row: Option<TaskRow> = sqlx::query_as(task_queries::GET_TASK_BY_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.into_domain()).transpose()?)
    }

    /// Returns a task to `PENDING` with a delayed `not_before` and an
    /// incremented retry counter. Exactly one of `transient`, `preflight`,
    /// `stuck` should be non-zero per call — the counters are independently
    /// bounded and must not be conflated.
    pub async fn retry_as_pending(
        &self,
        id: Uuid,
        not_before: DateTime<Utc>,
        transient: i32,
        preflight: i32,
        stuck: i32,
    ) -> Result<AnalysisTask, TaskStoreError> {
        let row: TaskRow = sqlx::query_as(task_queries::RETRY_AS_PENDING)
            .bind(id)
            .bind(not_before)
            .bind(transient)
            .bind(preflight)
            .bind(stuck)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into_domain()?)
    }

    pub async fn complete(
        &self,
        id: Uuid,
        state: TaskState,
        summary: &ResultSummary,
        has_result_files: bool,
        error_detail: Option<String>,
    ) -> Result<AnalysisTask, TaskStoreError> {
        debug_assert!(state.is_terminal(), "complete() must only be called with a terminal state");
        let state_str = match state {
            TaskState::Completed => "completed",
            TaskState::PartialSuccess => "partial_success",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
            _ => "failed",
        };
        let summary_json = serde_json::to_value(summary).map_err(sqlx::Error::Decode)?;
        let row: TaskRow = sqlx::query_as(task_queries::COMPLETE_TASK)
            .bind(id)
            .bind(state_str)
            .bind(summary_json)
            .bind(has_result_files)
            .bind(error_detail)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into_domain()?)
    }

    pub async fn fail(&self, id: Uuid, error_detail: impl Into<String>) -> Result<AnalysisTask, TaskStoreError> {
        let row: TaskRow = sqlx::query_as(task_queries::FAIL_TASK)
            .bind(id)
            .bind(error_detail.into())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into_domain()?)
    }

    /// No-op if the task is already terminal — cancelling an already-
    /// terminal task must be idempotent.
    pub async fn cancel(&self, id: Uuid) -> Result<Option<AnalysisTask>, TaskStoreError> {
        let row: Option<TaskRow> = sqlx::query_as(task_queries::CANCEL_TASK)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.into_domain()).transpose()?)
    }

    /// No-op (returns `None`) on an already-terminal task, matching
    /// `cancel()`'s idempotence.
    pub async fn mark_cancelling(&self, id: Uuid) -> Result<Option<AnalysisTask>, TaskStoreError> {
        let row: Option<TaskRow> = sqlx::query_as(task_queries::MARK_CANCELLING)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.into_domain()).transpose()?)
    }

    pub async fn find_stuck_running(&self, started_before: DateTime<Utc>) -> Result<Vec<AnalysisTask>, TaskStoreError> {
        let rows: Vec<TaskRow> = sqlx::query_as(task_queries::FIND_STUCK_RUNNING)
            .bind(started_before)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|r| Ok(r.into_domain()?)).collect()
    }

    /// Every child task the orchestrator created for one pipeline step
    /// batch or another, oldest first — used to recompute step/pipeline
    /// aggregate state without the orchestrator having to track task state
    /// itself.
    pub async fn list_by_pipeline(&self, pipeline_id: Uuid) -> Result<Vec<AnalysisTask>, TaskStoreError> {
        let rows: Vec<TaskRow> = sqlx::query_as(task_queries::GET_TASKS_BY_PIPELINE)
            .bind(pipeline_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|r| Ok(r.into_domain()?)).collect()
    }

    pub async fn find_missing_result_files(&self) -> Result<Vec<AnalysisTask>, TaskStoreError> {
        let rows: Vec<TaskRow> = sqlx::query_as(task_queries::FIND_MISSING_RESULT_FILES)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|r| Ok(r.into_domain()?)).collect()
    }

    pub async fn mark_result_files_written(&self, id: Uuid) -> Result<(), TaskStoreError> {
        sqlx::query(task_queries::MARK_RESULT_FILES_WRITTEN)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
