//! Pipeline Orchestrator: turns a `PipelineSpec` into a `Pipeline` row plus
//! the first batch of child `AnalysisTask` rows, then periodically walks
//! every non-terminal pipeline, creating each step's tasks the moment its
//! dependencies go terminal and rolling the aggregate state up from
//! `contracts::pipeline`'s aggregation rules.
//!
//! The orchestrator never executes a task itself — that's the executor's
//! job, running as an independent process against the same `analysis_tasks`
//! table. This actor only ever reads task state back and decides what to
//! create next. Every step's task templates travel with the persisted
//! `Pipeline` row (`PipelineStep::pending_tasks`), so a step blocked on a
//! dependency survives an orchestrator restart with nothing lost.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use contracts::pipeline::{Pipeline, PipelineState, PipelineStep, PipelineStepState};
use contracts::task::AnalysisTask;
use database::{PipelineStore, TaskStore};
use resilience::structured_logging::{AuditLevel, AuditLogEntry};

use crate::error::OrchestratorError;
use crate::spec::PipelineSpec;

const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(5);

pub struct PipelineOrchestrator {
    pipelines: PipelineStore,
    tasks: TaskStore,
    tick_interval: Duration,
    shutdown: CancellationToken,
}

impl PipelineOrchestrator {
    pub fn new(pipelines: PipelineStore, tasks: TaskStore) -> Self {
        Self {
            pipelines,
            tasks,
            tick_interval: DEFAULT_TICK_INTERVAL,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Validates the spec, inserts the pipeline row with every step's task
    /// templates attached, then immediately creates the first batch of
    /// child tasks for every step with no dependencies.
    pub async fn submit(&self, spec: PipelineSpec) -> Result<Pipeline, OrchestratorError> {
        validate(&spec)?;

        let steps: Vec<PipelineStep> = spec
            .steps
            .into_iter()
            .map(|s| PipelineStep {
                name: s.name,
                child_task_ids: Vec::new(),
                depends_on: s.depends_on,
                state: PipelineStepState::Pending,
                pending_tasks: s.tasks,
            })
            .collect();

        let pipeline = Pipeline {
            id: Uuid::new_v4(),
            steps,
            state: PipelineState::Running,
            created_at: Utc::now(),
            completed_at: None,
            retain_failed_children: true,
        };

        let pipeline = self.pipelines.insert(&pipeline).await?;
        self.create_unblocked_steps(pipeline).await
    }

    /// Signals the background tick loop to stop after its current pass.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Runs `tick()` on the configured interval until `stop()` is called.
    /// Intended to be spawned onto its own task by the caller, same shape
    /// as `executor::TaskExecutor::run`.
    pub async fn run(&self) {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return,
                _ = tokio::time::sleep(self.tick_interval) => {}
            }

            if let Err(error) = self.tick().await {
                tracing::error!(%error, "pipeline orchestrator tick failed, continuing");
            }
        }
    }

    /// One pass over every `running` pipeline: refresh each step's state
    /// from its children's current task states, create tasks for any step
    /// newly unblocked, and roll the pipeline's own state up.
    pub async fn tick(&self) -> Result<(), OrchestratorError> {
        for pipeline in self.pipelines.list_non_terminal().await? {
            if let Err(error) = self.tick_one(pipeline).await {
                tracing::error!(%error, "failed to advance one pipeline, continuing with the rest");
            }
        }
        Ok(())
    }

    async fn tick_one(&self, pipeline: Pipeline) -> Result<(), OrchestratorError> {
        let children = self.tasks.list_by_pipeline(pipeline.id).await?;
        let pipeline = self.recompute(pipeline, &children).await?;
        self.create_unblocked_steps(pipeline).await?;
        Ok(())
    }

    /// Recomputes every step's state from its current children, persists
    /// the rolled-up pipeline state, and returns the refreshed pipeline.
    async fn recompute(&self, mut pipeline: Pipeline, children: &[AnalysisTask]) -> Result<Pipeline, OrchestratorError> {
        for step in pipeline.steps.iter_mut() {
            let states: Vec<_> = children
                .iter()
                .filter(|t| step.child_task_ids.contains(&t.id))
                .map(|t| t.state)
                .collect();
            if !states.is_empty() {
                step.state = PipelineStepState::aggregate(&states);
            }
        }

        let step_states: Vec<_> = pipeline.steps.iter().map(|s| s.state).collect();
        let new_state = Pipeline::rollup(&step_states);
        let completed_at = if matches!(
            new_state,
            PipelineState::Completed | PipelineState::PartialSuccess | PipelineState::Failed
        ) {
            Some(Utc::now())
        } else {
            None
        };

        if completed_at.is_some() && new_state != pipeline.state {
            audit_terminal_transition(pipeline.id, new_state);
        }

        let updated = self
            .pipelines
            .update_state(pipeline.id, new_state, &pipeline.steps, completed_at)
            .await?;
        pipeline.state = updated.state;
        pipeline.completed_at = updated.completed_at;
        Ok(pipeline)
    }

    /// Creates child tasks for every step whose `pending_tasks` hasn't been
    /// drained yet and whose dependencies are all terminal, then persists
    /// the updated pipeline. Used both right after `submit()` (to seed the
    /// root steps, which are unblocked by definition) and from `tick_one`
    /// once a later step's dependencies clear.
    async fn create_unblocked_steps(&self, mut pipeline: Pipeline) -> Result<Pipeline, OrchestratorError> {
        let mut any_created = false;

        for idx in 0..pipeline.steps.len() {
            let unblocked = pipeline.step_is_unblocked(&pipeline.steps[idx].name);
            let step = &mut pipeline.steps[idx];
            if step.pending_tasks.is_empty() || !unblocked {
                continue;
            }

            for template in step.pending_tasks.drain(..) {
                let mut task = AnalysisTask::new(
                    template.app_model_identifier,
                    template.app_number,
                    template.kind,
                    template.tool_selection,
                    template.priority,
                );
                task.configuration = template.configuration;
                task.parent_pipeline_id = Some(pipeline.id);
                let inserted = self.tasks.insert(&task).await?;
                step.child_task_ids.push(inserted.id);
            }
            step.state = PipelineStepState::Running;
            any_created = true;
        }

        if !any_created {
            return Ok(pipeline);
        }

        let updated = self
            .pipelines
            .update_state(pipeline.id, pipeline.state, &pipeline.steps, pipeline.completed_at)
            .await?;
        Ok(updated)
    }

    /// Requests cancellation of a pipeline: every non-terminal child task
    /// across every step is cancelled. The pipeline's own state settles on
    /// the next `tick()` once those cancellations land — cancelled children
    /// roll up into `Failed` per `PipelineStepState::aggregate`, the same
    /// as any other all-failed step.
    pub async fn request_cancel(&self, pipeline_id: Uuid) -> Result<(), OrchestratorError> {
        let pipeline = self
            .pipelines
            .get(pipeline_id)
            .await?
            .ok_or(OrchestratorError::PipelineNotFound(pipeline_id))?;

        for step in &pipeline.steps {
            for task_id in &step.child_task_ids {
                self.tasks.cancel(*task_id).await?;
            }
        }
        Ok(())
    }
}

/// Persists a terminal pipeline's outcome to the audit trail. Every child
/// task row survives terminal rollup regardless of outcome
/// (`Pipeline::retain_failed_children`); this is the record of the rollup
/// decision itself, not a replacement for the rows it was computed from.
fn audit_terminal_transition(pipeline_id: Uuid, state: PipelineState) {
    let level = match state {
        PipelineState::Completed => AuditLevel::Info,
        PipelineState::PartialSuccess => AuditLevel::Warn,
        PipelineState::Failed => AuditLevel::Error,
        PipelineState::Running => return,
    };

    let entry = AuditLogEntry::new(level, "orchestrator", format!("pipeline reached {state:?}"))
        .with_correlation_id(pipeline_id.to_string())
        .with_operation("rollup");

    tracing::info!(audit = ?serde_json::to_value(&entry).unwrap_or_default(), "pipeline audit entry");
}

fn validate(spec: &PipelineSpec) -> Result<(), OrchestratorError> {
    let mut names = HashSet::new();
    for step in &spec.steps {
        if !names.insert(step.name.as_str()) {
            return Err(OrchestratorError::DuplicateStepName);
        }
    }
    for step in &spec.steps {
        for dep in &step.depends_on {
            if !names.contains(dep.as_str()) {
                return Err(OrchestratorError::UnknownDependency(step.name.clone(), dep.clone()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{ChildTaskTemplate, StepSpec};
    use contracts::task::{AnalysisKind, ToolSelection};

    fn sample_spec() -> PipelineSpec {
        PipelineSpec {
            steps: vec![
                StepSpec {
                    name: "generate".into(),
                    depends_on: vec![],
                    tasks: vec![ChildTaskTemplate {
                        app_model_identifier: "gpt-4".into(),
                        app_number: 1,
                        kind: AnalysisKind::Static,
                        tool_selection: ToolSelection::new(["bandit".to_string()]),
                        configuration: serde_json::Value::Null,
                        priority: 0,
                    }],
                },
                StepSpec {
                    name: "analyze".into(),
                    depends_on: vec!["generate".into()],
                    tasks: vec![ChildTaskTemplate {
                        app_model_identifier: "gpt-4".into(),
                        app_number: 1,
                        kind: AnalysisKind::Dynamic,
                        tool_selection: ToolSelection::new(["zap-baseline".to_string()]),
                        configuration: serde_json::Value::Null,
                        priority: 0,
                    }],
                },
            ],
        }
    }

    #[test]
    fn rejects_duplicate_step_names() {
        let mut spec = sample_spec();
        spec.steps[1].name = "generate".into();
        assert!(matches!(validate(&spec), Err(OrchestratorError::DuplicateStepName)));
    }

    #[test]
    fn rejects_dependency_on_unknown_step() {
        let mut spec = sample_spec();
        spec.steps[0].depends_on.push("nonexistent".into());
        assert!(matches!(
            validate(&spec),
            Err(OrchestratorError::UnknownDependency(_, _))
        ));
    }

    #[test]
    fn accepts_a_well_formed_spec() {
        assert!(validate(&sample_spec()).is_ok());
    }

    #[test]
    fn audit_entry_marks_failed_rollup_as_error_level() {
        let pipeline_id = Uuid::new_v4();
        let entry = AuditLogEntry::new(AuditLevel::Error, "orchestrator", format!("pipeline reached {:?}", PipelineState::Failed))
            .with_correlation_id(pipeline_id.to_string())
            .with_operation("rollup");
        assert_eq!(entry.correlation_id.as_deref(), Some(pipeline_id.to_string().as_str()));
        assert_eq!(entry.operation.as_deref(), Some("rollup"));
    }

    #[test]
    fn audit_terminal_transition_is_a_no_op_for_running_state() {
        // Running is not terminal; the function must return before building an
        // entry rather than emitting a misleading audit record.
        audit_terminal_transition(Uuid::new_v4(), PipelineState::Running);
    }
}
