//! Pipeline Orchestrator: composes a multi-step pipeline into batches of
//! child `AnalysisTask`s, observes their completion, and rolls the result
//! up per `contracts::pipeline`'s aggregation rules. Does not execute
//! tasks itself — see the `executor` crate for that.

pub mod error;
pub mod orchestrator;
pub mod spec;

pub use error::OrchestratorError;
pub use orchestrator::PipelineOrchestrator;
pub use spec::{ChildTaskTemplate, PipelineSpec, StepSpec};
