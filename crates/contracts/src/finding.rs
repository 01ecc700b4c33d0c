//! The uniform finding schema every tool's output is normalised into.

use serde::{Deserialize, Serialize};

/// Fixed five-level severity vocabulary every tool's native severity is
/// mapped into. Unknown tokens map to `Info` with a warning logged by the
/// caller — never silently dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Best-effort mapping from a tool-native severity token into the fixed
    /// vocabulary. Returns `None` when the token is unrecognised so the
    /// caller can log the fallback-to-`Info` decision with the original
    /// token attached.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "critical" | "blocker" => Some(Severity::Critical),
            "high" | "error" | "severe" => Some(Severity::High),
            "medium" | "moderate" | "warning" | "warn" => Some(Severity::Medium),
            "low" | "minor" => Some(Severity::Low),
            "info" | "informational" | "note" | "style" | "convention" => Some(Severity::Info),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingCategory {
    Security,
    CodeQuality,
    Performance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindingMessage {
    pub title: String,
    pub description: String,
    pub solution: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindingLocation {
    pub path: String,
    pub line_start: u32,
    pub line_end: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Evidence {
    pub code_snippet: Option<String>,
}

/// One normalised observation produced by a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub tool: String,
    pub category: FindingCategory,
    pub severity: Severity,
    pub rule_id: String,
    pub message: FindingMessage,
    pub file: FindingLocation,
    pub evidence: Evidence,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tokens_map_case_insensitively() {
        assert_eq!(Severity::from_token("HIGH"), Some(Severity::High));
        assert_eq!(Severity::from_token("Warning"), Some(Severity::Medium));
    }

    #[test]
    fn unknown_token_returns_none_so_caller_can_log_and_fallback() {
        assert_eq!(Severity::from_token("banana"), None);
    }

    #[test]
    fn severity_ordering_is_ascending() {
        assert!(Severity::Info < Severity::Low);
        assert!(Severity::High < Severity::Critical);
    }
}
