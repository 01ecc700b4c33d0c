//! Multi-step pipeline model: an ordered sequence of steps, each spawning
//! a batch of child analysis tasks, with the step and pipeline state
//! derived from the aggregate outcome of those children.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::{AnalysisKind, TaskId, ToolSelection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStepState {
    Pending,
    Running,
    Completed,
    PartialSuccess,
    Failed,
}

impl PipelineStepState {
    /// Aggregate a step's outcome from its child tasks' terminal states:
    /// completed when all succeeded, partial success when some succeeded and
    /// some failed, failed when all failed.
    pub fn aggregate(child_task_states: &[crate::task::TaskState]) -> Self {
        use crate::task::TaskState;

        if child_task_states.is_empty() {
            return PipelineStepState::Pending;
        }
        if child_task_states
            .iter()
            .any(|s| !s.is_terminal())
        {
            return PipelineStepState::Running;
        }

        let succeeded = child_task_states
            .iter()
            .filter(|s| matches!(s, TaskState::Completed | TaskState::PartialSuccess))
            .count();
        let failed = child_task_states
            .iter()
            .filter(|s| matches!(s, TaskState::Failed | TaskState::Cancelled))
            .count();

        if failed == 0 {
            PipelineStepState::Completed
        } else if succeeded > 0 {
            PipelineStepState::PartialSuccess
        } else {
            PipelineStepState::Failed
        }
    }
}

/// Template for one child task a step will create once it's unblocked.
/// Carried on the `PipelineStep` itself (rather than only in the caller's
/// submission request) so a not-yet-created step survives a process
/// restart: the orchestrator's tick loop rebuilds everything it needs to
/// create a step's tasks from the persisted `pipelines` row alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildTaskTemplate {
    pub app_model_identifier: String,
    pub app_number: u32,
    pub kind: AnalysisKind,
    pub tool_selection: ToolSelection,
    pub configuration: serde_json::Value,
    pub priority: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStep {
    pub name: String,
    pub child_task_ids: Vec<TaskId>,
    pub depends_on: Vec<String>,
    pub state: PipelineStepState,
    /// Cleared as tasks are created; empty once the step has fully started.
    /// A step with `child_task_ids` empty and `pending_tasks` non-empty is
    /// waiting on its dependencies, not yet started.
    pub pending_tasks: Vec<ChildTaskTemplate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Running,
    Completed,
    PartialSuccess,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: Uuid,
    pub steps: Vec<PipelineStep>,
    pub state: PipelineState,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Terminal pipelines retain every child task record, including failed
    /// ones, for post-mortem inspection.
    pub retain_failed_children: bool,
}

impl Pipeline {
    /// Roll up step states into the pipeline state using the same rule as
    /// step aggregation.
    pub fn rollup(step_states: &[PipelineStepState]) -> PipelineState {
        if step_states
            .iter()
            .any(|s| matches!(s, PipelineStepState::Pending | PipelineStepState::Running))
        {
            return PipelineState::Running;
        }

        let completed = step_states
            .iter()
            .filter(|s| matches!(s, PipelineStepState::Completed))
            .count();
        let failed = step_states
            .iter()
            .filter(|s| matches!(s, PipelineStepState::Failed))
            .count();

        if failed == 0 {
            PipelineState::Completed
        } else if completed > 0 || step_states.iter().any(|s| matches!(s, PipelineStepState::PartialSuccess)) {
            PipelineState::PartialSuccess
        } else {
            PipelineState::Failed
        }
    }

    /// A step may only advance once its declared dependencies have reached
    /// a terminal (non-`Running`) state — failure of one child must not
    /// cascade to siblings already running.
    pub fn step_is_unblocked(&self, step_name: &str) -> bool {
        let Some(step) = self.steps.iter().find(|s| s.name == step_name) else {
            return false;
        };
        step.depends_on.iter().all(|dep| {
            self.steps
                .iter()
                .find(|s| &s.name == dep)
                .map(|s| !matches!(s.state, PipelineStepState::Pending | PipelineStepState::Running))
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskState;

    #[test]
    fn step_aggregates_partial_success() {
        let states = vec![TaskState::Completed, TaskState::Failed];
        assert_eq!(
            PipelineStepState::aggregate(&states),
            PipelineStepState::PartialSuccess
        );
    }

    #[test]
    fn step_aggregates_all_failed() {
        let states = vec![TaskState::Failed, TaskState::Cancelled];
        assert_eq!(PipelineStepState::aggregate(&states), PipelineStepState::Failed);
    }

    #[test]
    fn step_pending_while_any_child_nonterminal() {
        let states = vec![TaskState::Completed, TaskState::Running];
        assert_eq!(PipelineStepState::aggregate(&states), PipelineStepState::Running);
    }

    #[test]
    fn rollup_stays_running_while_a_step_is_still_running() {
        // A step just started by `create_unblocked_steps` is `Running` with
        // its children still non-terminal, not `Pending` — rollup must treat
        // it the same way `PipelineStepState::aggregate` treats a running
        // child, or a freshly-submitted pipeline reports `Completed` on its
        // very first tick and then never gets ticked again.
        let states = vec![PipelineStepState::Running];
        assert_eq!(Pipeline::rollup(&states), PipelineState::Running);
    }

    #[test]
    fn rollup_completes_only_once_every_step_is_terminal() {
        let states = vec![PipelineStepState::Completed, PipelineStepState::Completed];
        assert_eq!(Pipeline::rollup(&states), PipelineState::Completed);
    }

    #[test]
    fn dependent_step_blocked_until_dependency_terminal() {
        let pipeline = Pipeline {
            id: Uuid::new_v4(),
            steps: vec![
                PipelineStep {
                    name: "generate".into(),
                    child_task_ids: vec![],
                    depends_on: vec![],
                    state: PipelineStepState::Running,
                    pending_tasks: vec![],
                },
                PipelineStep {
                    name: "analyze".into(),
                    child_task_ids: vec![],
                    depends_on: vec!["generate".into()],
                    state: PipelineStepState::Pending,
                    pending_tasks: vec![],
                },
            ],
            state: PipelineState::Running,
            created_at: Utc::now(),
            completed_at: None,
            retain_failed_children: true,
        };

        assert!(!pipeline.step_is_unblocked("analyze"));
    }

    #[test]
    fn sibling_failure_does_not_block_independent_step() {
        let pipeline = Pipeline {
            id: Uuid::new_v4(),
            steps: vec![
                PipelineStep {
                    name: "a".into(),
                    child_task_ids: vec![],
                    depends_on: vec![],
                    state: PipelineStepState::Failed,
                    pending_tasks: vec![],
                },
                PipelineStep {
                    name: "b".into(),
                    child_task_ids: vec![],
                    depends_on: vec![],
                    state: PipelineStepState::Pending,
                    pending_tasks: vec![],
                },
            ],
            state: PipelineState::Running,
            created_at: Utc::now(),
            completed_at: None,
            retain_failed_children: true,
        };

        assert!(pipeline.step_is_unblocked("b"));
    }
}
