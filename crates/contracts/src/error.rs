//! Shared error classification used by the pool, the Docker driver, and the
//! executor to decide retry/escalation policy consistently.

use thiserror::Error;

/// Broad bucket an [`OrchestrationError`] falls into, independent of which
/// crate raised it. The executor's retry and reaper logic branch on this
/// rather than on the concrete error variant, so new error sources can be
/// added without touching dispatch logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Caller-supplied input was invalid; retrying verbatim would fail again.
    Validation,
    /// Something required before dispatch (subject container, disk space)
    /// was not ready; eligible for preflight retry with backoff.
    Preflight,
    /// A transport-level hiccup (connection reset, timeout, 5xx) that a
    /// retry with backoff is likely to resolve.
    Transient,
    /// A dependency's health check failed; distinct from `Transient` because
    /// it drives circuit-breaker state rather than per-call retry.
    Health,
    /// An individual tool failed or exited non-zero; isolated to its own
    /// subtask and never escalated to the whole task.
    Tool,
    /// Some subtasks of a multi-kind task failed while others succeeded.
    Partial,
    /// An operation exceeded its deadline.
    Timeout,
    /// A task sat in `Running` past its liveness threshold and was reclaimed
    /// by the reaper.
    Stuck,
    /// Unrecoverable; no retry applies.
    Fatal,
}

impl ErrorClass {
    /// Whether the executor should schedule another attempt for an error of
    /// this class, versus marking the task/tool terminally failed.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorClass::Preflight | ErrorClass::Transient | ErrorClass::Stuck
        )
    }
}

#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("preflight check failed: {0}")]
    Preflight(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("health check failed for {target}: {reason}")]
    Health { target: String, reason: String },

    #[error("tool {tool} failed: {reason}")]
    Tool { tool: String, reason: String },

    #[error("{succeeded}/{total} subtasks succeeded, {failed} failed")]
    Partial {
        succeeded: u32,
        failed: u32,
        total: u32,
    },

    #[error("operation timed out after {elapsed_seconds:.1}s (limit {limit_seconds:.1}s)")]
    Timeout {
        elapsed_seconds: f64,
        limit_seconds: f64,
    },

    #[error("task stuck in running state since {running_since}")]
    Stuck { running_since: chrono::DateTime<chrono::Utc> },

    #[error("fatal error: {0}")]
    Fatal(String),
}

impl OrchestrationError {
    pub fn class(&self) -> ErrorClass {
        match self {
            OrchestrationError::Validation(_) => ErrorClass::Validation,
            OrchestrationError::Preflight(_) => ErrorClass::Preflight,
            OrchestrationError::Transient(_) => ErrorClass::Transient,
            OrchestrationError::Health { .. } => ErrorClass::Health,
            OrchestrationError::Tool { .. } => ErrorClass::Tool,
            OrchestrationError::Partial { .. } => ErrorClass::Partial,
            OrchestrationError::Timeout { .. } => ErrorClass::Timeout,
            OrchestrationError::Stuck { .. } => ErrorClass::Stuck,
            OrchestrationError::Fatal(_) => ErrorClass::Fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_and_preflight_and_stuck_are_retryable() {
        assert!(ErrorClass::Transient.is_retryable());
        assert!(ErrorClass::Preflight.is_retryable());
        assert!(ErrorClass::Stuck.is_retryable());
        assert!(!ErrorClass::Validation.is_retryable());
        assert!(!ErrorClass::Fatal.is_retryable());
        assert!(!ErrorClass::Tool.is_retryable());
    }

    #[test]
    fn class_matches_variant() {
        let err = OrchestrationError::Tool {
            tool: "bandit".into(),
            reason: "exit 2".into(),
        };
        assert_eq!(err.class(), ErrorClass::Tool);
    }
}
