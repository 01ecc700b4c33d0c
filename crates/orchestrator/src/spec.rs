//! Caller-supplied pipeline definitions: what each step's child tasks look
//! like, before any of them have a `TaskId`. The orchestrator turns one of
//! these into a `Pipeline` row, copying each step's task templates onto the
//! persisted `PipelineStep` itself so a not-yet-unblocked step survives a
//! process restart with no separate spec store to consult.

use serde::{Deserialize, Serialize};

pub use contracts::pipeline::ChildTaskTemplate;

/// One step of a pipeline: a named batch of child tasks plus the names of
/// the steps that must reach a terminal state before this one's tasks are
/// created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    pub name: String,
    pub depends_on: Vec<String>,
    pub tasks: Vec<ChildTaskTemplate>,
}

/// A full pipeline submission: an ordered set of steps, named uniquely
/// within the pipeline. Order in the `Vec` carries no scheduling meaning —
/// only `depends_on` does — but callers conventionally list steps in
/// dependency order for readability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub steps: Vec<StepSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::task::{AnalysisKind, ToolSelection};

    #[test]
    fn child_task_template_round_trips_through_json() {
        let template = ChildTaskTemplate {
            app_model_identifier: "gpt-4".into(),
            app_number: 3,
            kind: AnalysisKind::Static,
            tool_selection: ToolSelection::new(["bandit".to_string()]),
            configuration: serde_json::Value::Null,
            priority: 0,
        };
        let json = serde_json::to_string(&template).unwrap();
        let back: ChildTaskTemplate = serde_json::from_str(&json).unwrap();
        assert_eq!(back.app_model_identifier, "gpt-4");
    }
}
