//! Pipeline table operations. Pipelines never execute tasks themselves —
//! this store only persists the step/child-task bookkeeping the
//! orchestrator reads back to decide what to create next.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use contracts::pipeline::{Pipeline, PipelineState, PipelineStep};

use crate::models::{PipelineRow, RowConversionError};
use crate::queries::pipeline_queries;

#[derive(Debug, thiserror::Error)]
pub enum PipelineStoreError {
    #[error(transparent)]
    Query(#[from] sqlx::Error),
    #[error(transparent)]
    Row(#[from] RowConversionError),
}

#[derive(Clone)]
pub struct PipelineStore {
    pool: PgPool,
}

impl PipelineStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, pipeline: &Pipeline) -> Result<Pipeline, PipelineStoreError> {
        let row = PipelineRow::from_domain(pipeline)?;
        let inserted: PipelineRow = sqlx::query_as(pipeline_queries::INSERT_PIPELINE)
            .bind(row.id)
            .bind(row.state)
            .bind(row.steps)
            .bind(row.created_at)
            .bind(row.retain_failed_children)
            .fetch_one(&self.pool)
            .await?;
        Ok(inserted.into_domain()?)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Pipeline>, PipelineStoreError> {
        let row: Option<PipelineRow> = sqlx::query_as(pipeline_queries::GET_PIPELINE_BY_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.into_domain()).transpose()?)
    }

    pub async fn update_state(
        &self,
        id: Uuid,
        state: PipelineState,
        steps: &[PipelineStep],
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Pipeline, PipelineStoreError> {
        let state_str = match state {
            PipelineState::Running => "running",
            PipelineState::Completed => "completed",
            PipelineState::PartialSuccess => "partial_success",
            PipelineState::Failed => "failed",
        };
        let steps_json = serde_json::to_value(steps).map_err(sqlx::Error::Decode)?;
        let row: PipelineRow = sqlx::query_as(pipeline_queries::UPDATE_PIPELINE_STATE)
            .bind(id)
            .bind(state_str)
            .bind(steps_json)
            .bind(completed_at)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into_domain()?)
    }

    /// All pipelines still in `running` state, oldest first — what the
    /// orchestrator's tick loop iterates to look for newly-unblocked steps
    /// and completed children.
    pub async fn list_non_terminal(&self) -> Result<Vec<Pipeline>, PipelineStoreError> {
        let rows: Vec<PipelineRow> = sqlx::query_as(pipeline_queries::LIST_NON_TERMINAL)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|r| Ok(r.into_domain()?)).collect()
    }
}
