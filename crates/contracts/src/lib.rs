//! Shared domain vocabulary for the analysis orchestration core.
//!
//! Every other crate in the workspace depends on `contracts` for the types
//! that cross crate boundaries: the task and pipeline state machines, the
//! finding/tool-execution schema produced by normalisation, and the error
//! taxonomy used to classify failures consistently across the pool, the
//! Docker driver, and the executor.

pub mod error;
pub mod finding;
pub mod pipeline;
pub mod replica;
pub mod subject_application;
pub mod task;

pub use error::{ErrorClass, OrchestrationError};
pub use finding::{Evidence, Finding, FindingCategory, FindingLocation, Severity};
pub use pipeline::{Pipeline, PipelineState, PipelineStep, PipelineStepState};
pub use replica::{AnalyzerKind, ReplicaEndpointId, ReplicaStats};
pub use subject_application::{AppIdentity, SubjectApplication};
pub use task::{
    AnalysisTask, ResultSummary, SubtaskOutcome, TaskId, TaskState, ToolExecutionRecord,
    ToolSelection, ToolStatus,
};

/// Normalises a raw model slug the way the generation subsystem hands it to
/// the core: case-folded, punctuation mapped to underscores, provider
/// suffixes stripped (e.g. `"Qwen/Qwen2.5-Coder:7b"` -> `"qwen_qwen2_5_coder"`).
pub fn normalize_model_identifier(raw: &str) -> String {
    let without_provider_suffix = raw.split(':').next().unwrap_or(raw);
    let mut out = String::with_capacity(without_provider_suffix.len());
    for ch in without_provider_suffix.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push('_');
        }
    }
    // collapse runs of underscores produced by adjacent punctuation
    let mut collapsed = String::with_capacity(out.len());
    let mut last_was_underscore = false;
    for ch in out.chars() {
        if ch == '_' {
            if !last_was_underscore {
                collapsed.push(ch);
            }
            last_was_underscore = true;
        } else {
            collapsed.push(ch);
            last_was_underscore = false;
        }
    }
    collapsed.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_mixed_case_and_punctuation() {
        assert_eq!(
            normalize_model_identifier("Qwen/Qwen2.5-Coder:7b"),
            "qwen_qwen2_5_coder"
        );
    }

    #[test]
    fn collapses_repeated_separators() {
        assert_eq!(normalize_model_identifier("foo---bar"), "foo_bar");
    }

    #[test]
    fn strips_leading_and_trailing_underscores() {
        assert_eq!(normalize_model_identifier("--foo--"), "foo");
    }
}
