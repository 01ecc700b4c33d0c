//! Maps a tool identifier to the parser that knows its native output shape,
//! as a lookup table rather than a type-dispatch match — adding a tool means
//! registering a parser, not touching a central switch statement.

use std::collections::HashMap;

use contracts::finding::Finding;
use contracts::task::{ToolExecutionRecord, ToolStatus};

use crate::raw_output::RawToolOutput;

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("no parser registered for tool '{0}'")]
    UnknownTool(String),
    #[error("tool '{tool}' produced output the parser could not read: {reason}")]
    Malformed { tool: String, reason: String },
}

/// The normalised result of running one tool: its execution bookkeeping,
/// whatever findings it produced, and an optional raw SARIF document ready
/// for extraction by the result store.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub record: ToolExecutionRecord,
    pub findings: Vec<Finding>,
    pub sarif: Option<serde_json::Value>,
}

/// Parses one tool's raw output and native exit code into a [`ToolOutcome`].
/// Implementors own the exit-code policy for their tool: a lint-style tool
/// returning 1 to mean "issues found" maps that to `ToolStatus::NoIssues` or
/// `ToolStatus::Success` with findings attached, never to `Failed`.
pub trait ToolParser: Send + Sync {
    fn parse(&self, raw: &RawToolOutput, exit_code: i32, duration_seconds: f64) -> ToolOutcome;
}

pub struct ToolParserRegistry {
    parsers: HashMap<&'static str, Box<dyn ToolParser>>,
}

impl ToolParserRegistry {
    pub fn new() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: &'static str, parser: Box<dyn ToolParser>) -> &mut Self {
        self.parsers.insert(tool, parser);
        self
    }

    pub fn parse(
        &self,
        tool: &str,
        raw: &RawToolOutput,
        exit_code: i32,
        duration_seconds: f64,
    ) -> Result<ToolOutcome, NormalizeError> {
        let parser = self
            .parsers
            .get(tool)
            .ok_or_else(|| NormalizeError::UnknownTool(tool.to_string()))?;
        Ok(parser.parse(raw, exit_code, duration_seconds))
    }

    pub fn is_registered(&self, tool: &str) -> bool {
        self.parsers.contains_key(tool)
    }
}

impl Default for ToolParserRegistry {
    fn default() -> Self {
        crate::tools::default_registry()
    }
}

/// A tool that actually executed must never surface as `skipped`; this is
/// the consistency check parsers rely on when assembling a [`ToolOutcome`].
pub fn assert_consistent(record: &ToolExecutionRecord) {
    debug_assert!(
        record.status.is_consistent_with_executed(record.executed),
        "tool '{}' executed but reported status {:?}",
        record.tool,
        record.status
    );
}

pub(crate) fn skipped_record(tool: &str) -> ToolExecutionRecord {
    ToolExecutionRecord {
        tool: tool.to_string(),
        executed: false,
        status: ToolStatus::Skipped,
        issues_found: 0,
        duration_seconds: 0.0,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubParser;
    impl ToolParser for StubParser {
        fn parse(&self, _raw: &RawToolOutput, _exit_code: i32, duration_seconds: f64) -> ToolOutcome {
            ToolOutcome {
                record: ToolExecutionRecord {
                    tool: "stub".to_string(),
                    executed: true,
                    status: ToolStatus::Success,
                    issues_found: 0,
                    duration_seconds,
                    error: None,
                },
                findings: vec![],
                sarif: None,
            }
        }
    }

    #[test]
    fn unregistered_tool_is_an_error() {
        let registry = ToolParserRegistry::new();
        let result = registry.parse("bandit", &RawToolOutput::ExitCodeOnly(0), 0, 0.1);
        assert!(matches!(result, Err(NormalizeError::UnknownTool(_))));
    }

    #[test]
    fn registered_tool_dispatches_to_its_parser() {
        let mut registry = ToolParserRegistry::new();
        registry.register("stub", Box::new(StubParser));
        let outcome = registry
            .parse("stub", &RawToolOutput::ExitCodeOnly(0), 0, 1.5)
            .unwrap();
        assert_eq!(outcome.record.duration_seconds, 1.5);
    }
}
