//! `sqlx::FromRow` mirrors of the `contracts` domain types. Kept as plain
//! rows rather than deriving `FromRow` directly on the domain structs so
//! enum/JSON column mapping stays explicit and the domain types remain
//! free of a `sqlx` dependency.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use contracts::pipeline::{Pipeline, PipelineState, PipelineStep};
use contracts::task::{AnalysisKind, AnalysisTask, ResultSummary, TaskState, ToolSelection};

#[derive(Debug, Clone, FromRow)]
pub struct TaskRow {
    pub id: Uuid,
    pub app_model_identifier: String,
    pub app_number: i32,
    pub kind: String,
    pub tool_selection: Value,
    pub configuration: Value,
    pub priority: i32,
    pub state: String,
    pub parent_pipeline_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub not_before: Option<DateTime<Utc>>,
    pub preflight_retries: i32,
    pub transient_retries: i32,
    pub stuck_retries: i32,
    pub result_summary: Option<Value>,
    pub has_result_files: bool,
    pub error_detail: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RowConversionError {
    #[error("unknown analysis kind '{0}'")]
    UnknownKind(String),
    #[error("unknown task state '{0}'")]
    UnknownState(String),
    #[error("tool_selection column was not a JSON object: {0}")]
    MalformedToolSelection(String),
    #[error("result_summary column failed to deserialize: {0}")]
    MalformedSummary(#[from] serde_json::Error),
}

fn kind_to_str(kind: AnalysisKind) -> &'static str {
    match kind {
        AnalysisKind::Security => "security",
        AnalysisKind::Static => "static",
        AnalysisKind::Dynamic => "dynamic",
        AnalysisKind::Performance => "performance",
        AnalysisKind::Ai => "ai",
        AnalysisKind::Comprehensive => "comprehensive",
    }
}

fn str_to_kind(s: &str) -> Result<AnalysisKind, RowConversionError> {
    match s {
        "security" => Ok(AnalysisKind::Security),
        "static" => Ok(AnalysisKind::Static),
        "dynamic" => Ok(AnalysisKind::Dynamic),
        "performance" => Ok(AnalysisKind::Performance),
        "ai" => Ok(AnalysisKind::Ai),
        "comprehensive" => Ok(AnalysisKind::Comprehensive),
        other => Err(RowConversionError::UnknownKind(other.to_string())),
    }
}

fn state_to_str(state: TaskState) -> &'static str {
    match state {
        TaskState::Pending => "pending",
        TaskState::Running => "running",
        TaskState::Cancelling => "cancelling",
        TaskState::Completed => "completed",
        TaskState::PartialSuccess => "partial_success",
        TaskState::Failed => "failed",
        TaskState::Cancelled => "cancelled",
    }
}

fn str_to_state(s: &str) -> Result<TaskState, RowConversionError> {
    match s {
        "pending" => Ok(TaskState::Pending),
        "running" => Ok(TaskState::Running),
        "cancelling" => Ok(TaskState::Cancelling),
        "completed" => Ok(TaskState::Completed),
        "partial_success" => Ok(TaskState::PartialSuccess),
        "failed" => Ok(TaskState::Failed),
        "cancelled" => Ok(TaskState::Cancelled),
        other => Err(RowConversionError::UnknownState(other.to_string())),
    }
}

impl TaskRow {
    pub fn from_domain(task: &AnalysisTask) -> Result<Self, RowConversionError> {
        Ok(Self {
            id: task.id,
            app_model_identifier: task.app_model_identifier.clone(),
            app_number: task.app_number as i32,
            kind: kind_to_str(task.kind).to_string(),
            tool_selection: serde_json::to_value(&task.tool_selection)?,
            configuration: task.configuration.clone(),
            priority: task.priority,
            state: state_to_str(task.state).to_string(),
            parent_pipeline_id: task.parent_pipeline_id,
            created_at: task.created_at,
            started_at: task.started_at,
            completed_at: task.completed_at,
            not_before: task.not_before,
            preflight_retries: task.preflight_retries as i32,
            transient_retries: task.transient_retries as i32,
            stuck_retries: task.stuck_retries as i32,
            result_summary: task.summary.as_ref().map(serde_json::to_value).transpose()?,
            has_result_files: task.summary.as_ref().map(|s| s.has_result_files).unwrap_or(false),
            error_detail: task.error_detail.clone(),
        })
    }

    pub fn into_domain(self) -> Result<AnalysisTask, RowConversionError> {
        let tool_selection: ToolSelection = serde_json::from_value(self.tool_selection)
            .map_err(|e| RowConversionError::MalformedToolSelection(e.to_string()))?;
        let summary: Option<ResultSummary> = self.result_summary.map(serde_json::from_value).transpose()?;

        Ok(AnalysisTask {
            id: self.id,
            app_model_identifier: self.app_model_identifier,
            app_number: self.app_number as u32,
            kind: str_to_kind(&self.kind)?,
            tool_selection,
            configuration: self.configuration,
            priority: self.priority,
            state: str_to_state(&self.state)?,
            parent_pipeline_id: self.parent_pipeline_id,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            not_before: self.not_before,
            preflight_retries: self.preflight_retries as u32,
            transient_retries: self.transient_retries as u32,
            stuck_retries: self.stuck_retries as u32,
            summary,
            error_detail: self.error_detail,
        })
    }
}

fn pipeline_state_to_str(state: PipelineState) -> &'static str {
    match state {
        PipelineState::Running => "running",
        PipelineState::Completed => "completed",
        PipelineState::PartialSuccess => "partial_success",
        PipelineState::Failed => "failed",
    }
}

fn str_to_pipeline_state(s: &str) -> Result<PipelineState, RowConversionError> {
    match s {
        "running" => Ok(PipelineState::Running),
        "completed" => Ok(PipelineState::Completed),
        "partial_success" => Ok(PipelineState::PartialSuccess),
        "failed" => Ok(PipelineState::Failed),
        other => Err(RowConversionError::UnknownState(other.to_string())),
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PipelineRow {
    pub id: Uuid,
    pub state: String,
    pub steps: Value,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retain_failed_children: bool,
}

impl PipelineRow {
    pub fn from_domain(pipeline: &Pipeline) -> Result<Self, RowConversionError> {
        Ok(Self {
            id: pipeline.id,
            state: pipeline_state_to_str(pipeline.state).to_string(),
            steps: serde_json::to_value(&pipeline.steps)?,
            created_at: pipeline.created_at,
            completed_at: pipeline.completed_at,
            retain_failed_children: pipeline.retain_failed_children,
        })
    }

    pub fn into_domain(self) -> Result<Pipeline, RowConversionError> {
        let steps: Vec<PipelineStep> = serde_json::from_value(self.steps)?;
        Ok(Pipeline {
            id: self.id,
            steps,
            state: str_to_pipeline_state(&self.state)?,
            created_at: self.created_at,
            completed_at: self.completed_at,
            retain_failed_children: self.retain_failed_children,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SubjectApplicationRow {
    pub model_identifier: String,
    pub app_number: i32,
    pub backend_port: i32,
    pub frontend_port: i32,
    pub created_at: DateTime<Utc>,
    pub missing_since: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::task::{AnalysisTask, ToolSelection};

    #[test]
    fn round_trips_through_row_representation() {
        let task = AnalysisTask::new("m", 1, AnalysisKind::Static, ToolSelection::new(["bandit".to_string()]), 5);
        let row = TaskRow::from_domain(&task).unwrap();
        let back = row.into_domain().unwrap();

        assert_eq!(back.id, task.id);
        assert_eq!(back.kind, task.kind);
        assert_eq!(back.state, task.state);
        assert_eq!(back.tool_selection.tools, task.tool_selection.tools);
    }

    #[test]
    fn unknown_kind_string_is_rejected() {
        assert!(str_to_kind("not-a-kind").is_err());
    }

    #[test]
    fn pipeline_round_trips_through_row_representation() {
        use contracts::pipeline::{PipelineStepState};

        let pipeline = Pipeline {
            id: uuid::Uuid::new_v4(),
            steps: vec![contracts::pipeline::PipelineStep {
                name: "generate".into(),
                child_task_ids: vec![],
                depends_on: vec![],
                state: PipelineStepState::Running,
                pending_tasks: vec![],
            }],
            state: PipelineState::Running,
            created_at: Utc::now(),
            completed_at: None,
            retain_failed_children: true,
        };

        let row = PipelineRow::from_domain(&pipeline).unwrap();
        let back = row.into_domain().unwrap();
        assert_eq!(back.id, pipeline.id);
        assert_eq!(back.steps.len(), 1);
        assert_eq!(back.steps[0].name, "generate");
    }
}
