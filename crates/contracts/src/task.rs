//! Analysis task model and state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::replica::AnalyzerKind;

pub type TaskId = Uuid;

/// Requested analysis kind. `Comprehensive` fans out into one subtask per
/// [`AnalyzerKind`] it requires, each tracked and reported independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Security,
    Static,
    Dynamic,
    Performance,
    Ai,
    Comprehensive,
}

impl AnalysisKind {
    /// Which analyzer pools a task of this kind must dispatch to.
    /// `Security` is routed to the static pool: security tools run inside
    /// the static analyzer replica alongside the code-quality tools.
    pub fn required_analyzer_kinds(self) -> &'static [AnalyzerKind] {
        match self {
            AnalysisKind::Security => &[AnalyzerKind::Static],
            AnalysisKind::Static => &[AnalyzerKind::Static],
            AnalysisKind::Dynamic => &[AnalyzerKind::Dynamic],
            AnalysisKind::Performance => &[AnalyzerKind::Performance],
            AnalysisKind::Ai => &[AnalyzerKind::Ai],
            AnalysisKind::Comprehensive => &[
                AnalyzerKind::Static,
                AnalyzerKind::Dynamic,
                AnalyzerKind::Performance,
                AnalyzerKind::Ai,
            ],
        }
    }

    pub fn is_multi_kind(self) -> bool {
        self.required_analyzer_kinds().len() > 1
    }
}

/// Task lifecycle state machine.
///
/// ```text
///          ┌──────────────── admin purge (any state)
///          ▼
///     PENDING ──dispatch──► RUNNING ──success──► COMPLETED
///         ▲                    │
///         │                    ├─partial───► PARTIAL_SUCCESS
///         │                    ├─non-transient──► FAILED
///         │                    └─cancel──► CANCELLED
///         └────── transient retry / reaper ───────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Cancelling,
    Completed,
    PartialSuccess,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::PartialSuccess | TaskState::Failed | TaskState::Cancelled
        )
    }
}

/// A tool identifier bundled with any per-tool configuration overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSelection {
    pub tools: BTreeSet<String>,
}

impl ToolSelection {
    pub fn new(tools: impl IntoIterator<Item = String>) -> Self {
        Self {
            tools: tools.into_iter().collect(),
        }
    }
}

/// Per-tool exit status, distinct from the task's own terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    NoIssues,
    Completed,
    Skipped,
    Failed,
}

impl ToolStatus {
    /// A tool that actually executed must never report `Skipped`.
    pub fn is_consistent_with_executed(self, executed: bool) -> bool {
        !executed || self != ToolStatus::Skipped
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionRecord {
    pub tool: String,
    pub executed: bool,
    pub status: ToolStatus,
    pub issues_found: u32,
    pub duration_seconds: f64,
    pub error: Option<String>,
}

/// Per-subtask breakdown for `PARTIAL_SUCCESS` / `FAILED` tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskOutcome {
    pub kind: AnalyzerKind,
    pub state: TaskState,
    pub failure_reason: Option<String>,
}

/// Compact summary persisted on the task row and mirrored into the
/// on-disk payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSummary {
    pub total_findings: u32,
    pub findings_by_severity: std::collections::BTreeMap<String, u32>,
    pub tools: Vec<String>,
    pub subtasks: Vec<SubtaskOutcome>,
    pub has_result_files: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisTask {
    pub id: TaskId,
    pub app_model_identifier: String,
    pub app_number: u32,
    pub kind: AnalysisKind,
    pub tool_selection: ToolSelection,
    pub configuration: serde_json::Value,
    pub priority: i32,
    pub state: TaskState,
    pub parent_pipeline_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub not_before: Option<DateTime<Utc>>,
    pub preflight_retries: u32,
    pub transient_retries: u32,
    pub stuck_retries: u32,
    pub summary: Option<ResultSummary>,
    pub error_detail: Option<String>,
}

impl AnalysisTask {
    pub fn new(
        app_model_identifier: impl Into<String>,
        app_number: u32,
        kind: AnalysisKind,
        tool_selection: ToolSelection,
        priority: i32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            app_model_identifier: app_model_identifier.into(),
            app_number,
            kind,
            tool_selection,
            configuration: serde_json::Value::Null,
            priority,
            state: TaskState::Pending,
            parent_pipeline_id: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            not_before: None,
            preflight_retries: 0,
            transient_retries: 0,
            stuck_retries: 0,
            summary: None,
            error_detail: None,
        }
    }

    /// A terminal task must never be mutated except by administrative purge.
    pub fn is_mutable(&self) -> bool {
        !self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comprehensive_requires_all_four_kinds() {
        assert_eq!(
            AnalysisKind::Comprehensive.required_analyzer_kinds().len(),
            4
        );
        assert!(AnalysisKind::Comprehensive.is_multi_kind());
        assert!(!AnalysisKind::Static.is_multi_kind());
    }

    #[test]
    fn security_routes_to_static_pool() {
        assert_eq!(
            AnalysisKind::Security.required_analyzer_kinds(),
            &[AnalyzerKind::Static]
        );
    }

    #[test]
    fn tool_status_rejects_skipped_for_executed_tools() {
        assert!(!ToolStatus::Skipped.is_consistent_with_executed(true));
        assert!(ToolStatus::Skipped.is_consistent_with_executed(false));
        assert!(ToolStatus::Success.is_consistent_with_executed(true));
    }

    #[test]
    fn terminal_states_are_immutable() {
        let mut task = AnalysisTask::new("m", 1, AnalysisKind::Static, ToolSelection::new([]), 0);
        assert!(task.is_mutable());
        task.state = TaskState::Completed;
        assert!(!task.is_mutable());
    }
}
