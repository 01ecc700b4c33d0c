//! Filters a replica's raw `tools` response map down to entries that are
//! actually per-tool records, not service-level bookkeeping.

use serde_json::Value;

/// Lower-cased keys that are always service metadata, never a tool record,
/// regardless of what their value looks like.
const RESERVED_KEYS: &[&str] = &[
    "tool_status",
    "_metadata",
    "status",
    "file_counts",
    "security_files",
    "total_files",
    "message",
    "error",
    "analysis_time",
    "model_slug",
    "app_number",
    "tools_used",
    "configuration_applied",
    "results",
    "_project_metadata",
];

/// Fields at least one of which must be present for an entry to be admitted
/// as a tool record, once it has survived the reserved-key check.
const TOOL_RECORD_MARKERS: &[&str] = &["tool", "executed", "status"];

fn is_reserved_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    RESERVED_KEYS.iter().any(|reserved| *reserved == lower)
}

fn looks_like_tool_record(value: &Value) -> bool {
    let Value::Object(obj) = value else {
        return false;
    };
    TOOL_RECORD_MARKERS.iter().any(|marker| obj.contains_key(*marker))
}

/// Walks a raw `tools` object and returns only the entries that are genuine
/// tool records, logging a trace for everything dropped so a missed marker
/// field shows up in logs instead of silently vanishing.
pub fn filter_tool_entries(tools: &serde_json::Map<String, Value>) -> Vec<(String, Value)> {
    let mut admitted = Vec::new();
    for (key, value) in tools {
        if is_reserved_key(key) {
            tracing::trace!(key, "dropping reserved metadata key from tools map");
            continue;
        }
        if !looks_like_tool_record(value) {
            tracing::trace!(key, "dropping entry with no tool-record marker field");
            continue;
        }
        admitted.push((key.clone(), value.clone()));
    }
    admitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn drops_reserved_keys_case_insensitively() {
        let tools = json!({
            "Status": "ok",
            "_METADATA": {"foo": "bar"},
            "bandit": {"tool": "bandit", "executed": true, "status": "success"},
        })
        .as_object()
        .unwrap()
        .clone();

        let admitted = filter_tool_entries(&tools);
        assert_eq!(admitted.len(), 1);
        assert_eq!(admitted[0].0, "bandit");
    }

    #[test]
    fn drops_entries_with_no_marker_field() {
        let tools = json!({
            "random_blob": {"some_key": "some_value"},
            "eslint": {"executed": true},
        })
        .as_object()
        .unwrap()
        .clone();

        let admitted = filter_tool_entries(&tools);
        assert_eq!(admitted.len(), 1);
        assert_eq!(admitted[0].0, "eslint");
    }

    #[test]
    fn non_object_values_are_never_admitted() {
        let tools = json!({
            "total_files": 42,
            "mypy": {"status": "success"},
        })
        .as_object()
        .unwrap()
        .clone();

        let admitted = filter_tool_entries(&tools);
        assert_eq!(admitted.len(), 1);
        assert_eq!(admitted[0].0, "mypy");
    }
}
