//! Audit-trail projection shape.
//!
//! Day-to-day logging goes straight through `tracing` spans and events at
//! the call site; this module only defines the flattened record the
//! orchestrator's audit trail persists for a pipeline run, independent of
//! whatever log sink `tracing-subscriber` is configured with.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub timestamp: SystemTime,
    pub level: AuditLevel,
    pub message: String,
    pub correlation_id: Option<String>,
    pub component: String,
    pub operation: Option<String>,
    pub duration_ms: Option<u64>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AuditLogEntry {
    pub fn new(level: AuditLevel, component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            level,
            message: message.into(),
            correlation_id: None,
            component: component.into(),
            operation: None,
            duration_ms: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_methods_compose() {
        let entry = AuditLogEntry::new(AuditLevel::Info, "executor", "dispatched task")
            .with_correlation_id("task-123")
            .with_operation("dispatch")
            .with_duration(42)
            .with_metadata("tool_count", 3.into());

        assert_eq!(entry.correlation_id.as_deref(), Some("task-123"));
        assert_eq!(entry.operation.as_deref(), Some("dispatch"));
        assert_eq!(entry.duration_ms, Some(42));
        assert_eq!(entry.metadata.get("tool_count"), Some(&3.into()));
    }
}
