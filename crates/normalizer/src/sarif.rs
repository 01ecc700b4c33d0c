//! SARIF extraction: a tool's raw SARIF document is pulled out of the
//! per-tool outcome and replaced with a reference, so the stored snapshot
//! stays small while the full document is still reachable on disk.
//!
//! A handful of tools in this registry emit SARIF natively; the rest get a
//! SARIF projection synthesised from their already-normalised findings, per
//! `spec.md` §4.1 ("Tools that natively emit SARIF (or for which a SARIF
//! projection is synthesised)..."). Either way the shape reaching the result
//! store is the same `serde_json::Value`, so the extraction/consolidation
//! path downstream never needs to know which.

use contracts::finding::{Finding, Severity};
use serde_json::{json, Value};

const SARIF_SCHEMA: &str = "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/master/Schemata/sarif-schema-2.1.0.json";
const SARIF_VERSION: &str = "2.1.0";

fn sarif_level(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical | Severity::High => "error",
        Severity::Medium => "warning",
        Severity::Low | Severity::Info => "note",
    }
}

/// Builds a minimal valid SARIF 2.1.0 document with a single run, one
/// result per finding. Used both for tools with no native SARIF output and
/// as the uniform shape tools that do emit SARIF natively are normalised
/// into, so every tool in the registry carries a document the result store
/// can extract and consolidate identically.
pub fn findings_to_sarif(tool: &str, findings: &[Finding]) -> Value {
    let results: Vec<Value> = findings
        .iter()
        .map(|finding| {
            json!({
                "ruleId": finding.rule_id,
                "level": sarif_level(finding.severity),
                "message": { "text": if finding.message.title.is_empty() {
                    finding.message.description.clone()
                } else {
                    finding.message.title.clone()
                }},
                "locations": [{
                    "physicalLocation": {
                        "artifactLocation": { "uri": finding.file.path },
                        "region": region_for(finding),
                    }
                }],
            })
        })
        .collect();

    json!({
        "$schema": SARIF_SCHEMA,
        "version": SARIF_VERSION,
        "runs": [{
            "tool": { "driver": { "name": tool, "informationUri": Value::Null, "rules": Value::Array(vec![]) } },
            "results": results,
        }],
    })
}

fn region_for(finding: &Finding) -> Value {
    let mut region = serde_json::Map::new();
    region.insert("startLine".to_string(), json!(finding.file.line_start.max(1)));
    if let Some(end) = finding.file.line_end {
        region.insert("endLine".to_string(), json!(end));
    }
    Value::Object(region)
}

/// Deterministic relative path a tool's extracted SARIF document is written
/// to, rooted at the task's results directory.
pub fn sarif_relative_path(service: &str, tool: &str) -> String {
    format!("sarif/{service}_{tool}.sarif.json")
}

/// Relative path of the consolidated, per-service SARIF document (one run
/// per contributing tool) `spec.md` §4.1/§6 describe alongside the
/// per-tool files.
pub fn consolidated_relative_path(service: &str) -> String {
    format!("sarif/{service}_consolidated.sarif.json")
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SarifReference {
    pub sarif_file: String,
}

impl SarifReference {
    pub fn new(service: &str, tool: &str) -> Self {
        Self {
            sarif_file: sarif_relative_path(service, tool),
        }
    }
}

/// Merges every contributing tool's SARIF document into one, concatenating
/// their `runs` arrays. Malformed documents (missing/non-array `runs`) are
/// skipped rather than aborting the whole consolidation — one tool's
/// unexpected shape should not cost every other tool its consolidated
/// entry.
pub fn consolidate(documents: &[Value]) -> Value {
    let mut runs = Vec::new();
    for document in documents {
        if let Some(document_runs) = document.get("runs").and_then(Value::as_array) {
            runs.extend(document_runs.iter().cloned());
        }
    }

    json!({
        "$schema": SARIF_SCHEMA,
        "version": SARIF_VERSION,
        "runs": runs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::finding::{Evidence, FindingCategory, FindingLocation, FindingMessage};

    fn sample_finding(tool: &str, severity: Severity) -> Finding {
        Finding {
            tool: tool.to_string(),
            category: FindingCategory::Security,
            severity,
            rule_id: "B101".to_string(),
            message: FindingMessage {
                title: "hardcoded password".to_string(),
                description: "a password literal was found in source".to_string(),
                solution: None,
            },
            file: FindingLocation {
                path: "app.py".to_string(),
                line_start: 10,
                line_end: Some(12),
            },
            evidence: Evidence::default(),
        }
    }

    #[test]
    fn path_is_namespaced_by_service_and_tool() {
        assert_eq!(sarif_relative_path("static", "bandit"), "sarif/static_bandit.sarif.json");
    }

    #[test]
    fn consolidated_path_is_namespaced_by_service_only() {
        assert_eq!(consolidated_relative_path("static"), "sarif/static_consolidated.sarif.json");
    }

    #[test]
    fn reference_serialises_to_single_field() {
        let reference = SarifReference::new("static", "bandit");
        let value = serde_json::to_value(&reference).unwrap();
        assert_eq!(value, serde_json::json!({"sarif_file": "sarif/static_bandit.sarif.json"}));
    }

    #[test]
    fn findings_to_sarif_maps_one_result_per_finding() {
        let findings = vec![sample_finding("bandit", Severity::High)];
        let document = findings_to_sarif("bandit", &findings);
        let results = document["runs"][0]["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["ruleId"], "B101");
        assert_eq!(results[0]["level"], "error");
        assert_eq!(results[0]["locations"][0]["physicalLocation"]["artifactLocation"]["uri"], "app.py");
    }

    #[test]
    fn empty_findings_still_produce_a_valid_run_with_no_results() {
        let document = findings_to_sarif("mypy", &[]);
        assert_eq!(document["runs"][0]["results"].as_array().unwrap().len(), 0);
        assert_eq!(document["version"], "2.1.0");
    }

    #[test]
    fn consolidate_merges_runs_from_every_document() {
        let bandit_doc = findings_to_sarif("bandit", &[sample_finding("bandit", Severity::High)]);
        let semgrep_doc = findings_to_sarif("semgrep", &[sample_finding("semgrep", Severity::Medium)]);

        let consolidated = consolidate(&[bandit_doc, semgrep_doc]);
        assert_eq!(consolidated["runs"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn consolidate_skips_malformed_documents_without_aborting() {
        let good = findings_to_sarif("bandit", &[sample_finding("bandit", Severity::High)]);
        let malformed = serde_json::json!({"not_runs": []});

        let consolidated = consolidate(&[good, malformed]);
        assert_eq!(consolidated["runs"].as_array().unwrap().len(), 1);
    }
}
