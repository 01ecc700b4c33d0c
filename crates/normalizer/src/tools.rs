//! Concrete parsers for the tool set the registry ships with.
//!
//! Each parser owns its tool's exit-code policy and its native output
//! shape; nothing here is generic across tools beyond the finding schema
//! they all produce.

use contracts::finding::{Evidence, Finding, FindingCategory, FindingLocation, FindingMessage, Severity};
use contracts::task::{ToolExecutionRecord, ToolStatus};
use serde_json::Value;

use crate::raw_output::RawToolOutput;
use crate::registry::{ToolOutcome, ToolParser, ToolParserRegistry};

fn severity_or_info_with_warning(tool: &str, token: &str) -> Severity {
    Severity::from_token(token).unwrap_or_else(|| {
        tracing::warn!(tool, token, "unrecognised severity token, defaulting to info");
        Severity::Info
    })
}

fn record(tool: &str, executed: bool, status: ToolStatus, issues_found: u32, duration_seconds: f64, error: Option<String>) -> ToolExecutionRecord {
    ToolExecutionRecord {
        tool: tool.to_string(),
        executed,
        status,
        issues_found,
        duration_seconds,
        error,
    }
}

fn invocation_failed(tool: &str, duration_seconds: f64, reason: String) -> ToolOutcome {
    ToolOutcome {
        record: record(tool, true, ToolStatus::Failed, 0, duration_seconds, Some(reason)),
        findings: vec![],
        sarif: None,
    }
}

/// Bandit (Python security scanner). Exit codes: 0 clean, 1 issues found
/// (not a failure), 2+ invocation error.
pub struct BanditParser;

impl ToolParser for BanditParser {
    fn parse(&self, raw: &RawToolOutput, exit_code: i32, duration_seconds: f64) -> ToolOutcome {
        if exit_code >= 2 {
            return invocation_failed("bandit", duration_seconds, format!("bandit exited {exit_code}"));
        }
        let Some(json) = raw.as_json() else {
            return invocation_failed("bandit", duration_seconds, "expected JSON output".into());
        };
        let findings: Vec<Finding> = json
            .get("results")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .map(|r| Finding {
                tool: "bandit".to_string(),
                category: FindingCategory::Security,
                severity: severity_or_info_with_warning(
                    "bandit",
                    r.get("issue_severity").and_then(Value::as_str).unwrap_or("info"),
                ),
                rule_id: r.get("test_id").and_then(Value::as_str).unwrap_or("unknown").to_string(),
                message: FindingMessage {
                    title: r.get("test_name").and_then(Value::as_str).unwrap_or("").to_string(),
                    description: r.get("issue_text").and_then(Value::as_str).unwrap_or("").to_string(),
                    solution: None,
                },
                file: FindingLocation {
                    path: r.get("filename").and_then(Value::as_str).unwrap_or("").to_string(),
                    line_start: r.get("line_number").and_then(Value::as_u64).unwrap_or(0) as u32,
                    line_end: None,
                },
                evidence: Evidence {
                    code_snippet: r.get("code").and_then(Value::as_str).map(str::to_string),
                },
            })
            .collect();

        let status = if findings.is_empty() { ToolStatus::NoIssues } else { ToolStatus::Success };
        let sarif = Some(crate::sarif::findings_to_sarif("bandit", &findings));
        ToolOutcome {
            record: record("bandit", true, status, findings.len() as u32, duration_seconds, None),
            findings,
            sarif,
        }
    }
}

/// Semgrep (static/Python, rule-based). Exit codes mirror bandit's policy.
pub struct SemgrepParser;

impl ToolParser for SemgrepParser {
    fn parse(&self, raw: &RawToolOutput, exit_code: i32, duration_seconds: f64) -> ToolOutcome {
        if exit_code >= 2 {
            return invocation_failed("semgrep", duration_seconds, format!("semgrep exited {exit_code}"));
        }
        let Some(json) = raw.as_json() else {
            return invocation_failed("semgrep", duration_seconds, "expected JSON output".into());
        };
        let findings: Vec<Finding> = json
            .get("results")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .map(|r| {
                let extra = r.get("extra");
                Finding {
                    tool: "semgrep".to_string(),
                    category: FindingCategory::Security,
                    severity: severity_or_info_with_warning(
                        "semgrep",
                        extra.and_then(|e| e.get("severity")).and_then(Value::as_str).unwrap_or("info"),
                    ),
                    rule_id: r.get("check_id").and_then(Value::as_str).unwrap_or("unknown").to_string(),
                    message: FindingMessage {
                        title: r.get("check_id").and_then(Value::as_str).unwrap_or("").to_string(),
                        description: extra.and_then(|e| e.get("message")).and_then(Value::as_str).unwrap_or("").to_string(),
                        solution: None,
                    },
                    file: FindingLocation {
                        path: r.get("path").and_then(Value::as_str).unwrap_or("").to_string(),
                        line_start: r.get("start").and_then(|s| s.get("line")).and_then(Value::as_u64).unwrap_or(0) as u32,
                        line_end: r.get("end").and_then(|s| s.get("line")).and_then(Value::as_u64).map(|v| v as u32),
                    },
                    evidence: Evidence { code_snippet: None },
                }
            })
            .collect();

        let status = if findings.is_empty() { ToolStatus::NoIssues } else { ToolStatus::Success };
        let sarif = Some(crate::sarif::findings_to_sarif("semgrep", &findings));
        ToolOutcome {
            record: record("semgrep", true, status, findings.len() as u32, duration_seconds, None),
            findings,
            sarif,
        }
    }
}

/// Safety (Python dependency vulnerability auditor).
pub struct SafetyParser;

impl ToolParser for SafetyParser {
    fn parse(&self, raw: &RawToolOutput, exit_code: i32, duration_seconds: f64) -> ToolOutcome {
        if exit_code >= 2 {
            return invocation_failed("safety", duration_seconds, format!("safety exited {exit_code}"));
        }
        let Some(json) = raw.as_json() else {
            return invocation_failed("safety", duration_seconds, "expected JSON output".into());
        };
        let findings: Vec<Finding> = json
            .get("vulnerabilities")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .map(|v| Finding {
                tool: "safety".to_string(),
                category: FindingCategory::Security,
                severity: severity_or_info_with_warning(
                    "safety",
                    v.get("severity").and_then(Value::as_str).unwrap_or("medium"),
                ),
                rule_id: v.get("vulnerability_id").and_then(Value::as_str).unwrap_or("unknown").to_string(),
                message: FindingMessage {
                    title: format!(
                        "{} {}",
                        v.get("package_name").and_then(Value::as_str).unwrap_or(""),
                        v.get("analyzed_version").and_then(Value::as_str).unwrap_or("")
                    ),
                    description: v.get("advisory").and_then(Value::as_str).unwrap_or("").to_string(),
                    solution: v
                        .get("fixed_versions")
                        .and_then(Value::as_array)
                        .map(|fixes| format!("upgrade to one of: {fixes:?}")),
                },
                file: FindingLocation {
                    path: "requirements.txt".to_string(),
                    line_start: 0,
                    line_end: None,
                },
                evidence: Evidence { code_snippet: None },
            })
            .collect();

        let status = if findings.is_empty() { ToolStatus::NoIssues } else { ToolStatus::Success };
        let sarif = Some(crate::sarif::findings_to_sarif("safety", &findings));
        ToolOutcome {
            record: record("safety", true, status, findings.len() as u32, duration_seconds, None),
            findings,
            sarif,
        }
    }
}

/// Pylint. Exit code is a bit-flag composite (1 fatal, 2 error, 4 warning,
/// 8 refactor, 16 convention, 32 usage error) — only the fatal and
/// usage-error bits mean the tool itself failed.
pub struct PylintParser;

const PYLINT_FATAL_BIT: i32 = 1;
const PYLINT_USAGE_ERROR_BIT: i32 = 32;

impl ToolParser for PylintParser {
    fn parse(&self, raw: &RawToolOutput, exit_code: i32, duration_seconds: f64) -> ToolOutcome {
        if exit_code & (PYLINT_FATAL_BIT | PYLINT_USAGE_ERROR_BIT) != 0 {
            return invocation_failed("pylint", duration_seconds, format!("pylint exited {exit_code}"));
        }
        let Some(json) = raw.as_json() else {
            return invocation_failed("pylint", duration_seconds, "expected JSON output".into());
        };
        let findings: Vec<Finding> = json
            .as_array()
            .into_iter()
            .flatten()
            .map(|m| {
                let pylint_type = m.get("type").and_then(Value::as_str).unwrap_or("convention");
                Finding {
                    tool: "pylint".to_string(),
                    category: FindingCategory::CodeQuality,
                    severity: match pylint_type {
                        "fatal" | "error" => Severity::High,
                        "warning" => Severity::Medium,
                        "refactor" => Severity::Low,
                        _ => Severity::Info,
                    },
                    rule_id: m.get("message-id").and_then(Value::as_str).unwrap_or("unknown").to_string(),
                    message: FindingMessage {
                        title: m.get("symbol").and_then(Value::as_str).unwrap_or("").to_string(),
                        description: m.get("message").and_then(Value::as_str).unwrap_or("").to_string(),
                        solution: None,
                    },
                    file: FindingLocation {
                        path: m.get("path").and_then(Value::as_str).unwrap_or("").to_string(),
                        line_start: m.get("line").and_then(Value::as_u64).unwrap_or(0) as u32,
                        line_end: None,
                    },
                    evidence: Evidence { code_snippet: None },
                }
            })
            .collect();

        let status = if findings.is_empty() { ToolStatus::NoIssues } else { ToolStatus::Success };
        let sarif = Some(crate::sarif::findings_to_sarif("pylint", &findings));
        ToolOutcome {
            record: record("pylint", true, status, findings.len() as u32, duration_seconds, None),
            findings,
            sarif,
        }
    }
}

/// Mypy. Exit codes: 0 clean, 1 type errors found, 2 fatal error.
pub struct MypyParser;

impl ToolParser for MypyParser {
    fn parse(&self, raw: &RawToolOutput, exit_code: i32, duration_seconds: f64) -> ToolOutcome {
        if exit_code >= 2 {
            return invocation_failed("mypy", duration_seconds, format!("mypy exited {exit_code}"));
        }
        let Some(text) = raw.as_text() else {
            return invocation_failed("mypy", duration_seconds, "expected text output".into());
        };

        let findings: Vec<Finding> = text
            .lines()
            .filter_map(parse_mypy_line)
            .collect();

        let status = if findings.is_empty() { ToolStatus::NoIssues } else { ToolStatus::Success };
        let sarif = Some(crate::sarif::findings_to_sarif("mypy", &findings));
        ToolOutcome {
            record: record("mypy", true, status, findings.len() as u32, duration_seconds, None),
            findings,
            sarif,
        }
    }
}

/// `path:line: severity: message  [error-code]`
fn parse_mypy_line(line: &str) -> Option<Finding> {
    let mut parts = line.splitn(4, ':');
    let path = parts.next()?.trim();
    let line_no: u32 = parts.next()?.trim().parse().ok()?;
    let severity_token = parts.next()?.trim();
    let rest = parts.next()?.trim();
    if path.is_empty() || !["error", "warning", "note"].contains(&severity_token) {
        return None;
    }

    let (message, rule_id) = match rest.rsplit_once('[') {
        Some((msg, code)) => (msg.trim().to_string(), code.trim_end_matches(']').to_string()),
        None => (rest.to_string(), "unknown".to_string()),
    };

    Some(Finding {
        tool: "mypy".to_string(),
        category: FindingCategory::CodeQuality,
        severity: match severity_token {
            "error" => Severity::High,
            "warning" => Severity::Medium,
            _ => Severity::Info,
        },
        rule_id,
        message: FindingMessage {
            title: message.clone(),
            description: message,
            solution: None,
        },
        file: FindingLocation {
            path: path.to_string(),
            line_start: line_no,
            line_end: None,
        },
        evidence: Evidence { code_snippet: None },
    })
}

/// ESLint. Exit codes: 0 clean, 1 lint errors found, 2 fatal config error.
pub struct EslintParser;

impl ToolParser for EslintParser {
    fn parse(&self, raw: &RawToolOutput, exit_code: i32, duration_seconds: f64) -> ToolOutcome {
        if exit_code >= 2 {
            return invocation_failed("eslint", duration_seconds, format!("eslint exited {exit_code}"));
        }
        let Some(json) = raw.as_json() else {
            return invocation_failed("eslint", duration_seconds, "expected JSON output".into());
        };
        let findings: Vec<Finding> = json
            .as_array()
            .into_iter()
            .flatten()
            .flat_map(|file_result| {
                let path = file_result.get("filePath").and_then(Value::as_str).unwrap_or("").to_string();
                file_result
                    .get("messages")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .map(move |m| {
                        let severity_code = m.get("severity").and_then(Value::as_i64).unwrap_or(1);
                        Finding {
                            tool: "eslint".to_string(),
                            category: FindingCategory::CodeQuality,
                            severity: if severity_code >= 2 { Severity::High } else { Severity::Medium },
                            rule_id: m.get("ruleId").and_then(Value::as_str).unwrap_or("unknown").to_string(),
                            message: FindingMessage {
                                title: m.get("message").and_then(Value::as_str).unwrap_or("").to_string(),
                                description: m.get("message").and_then(Value::as_str).unwrap_or("").to_string(),
                                solution: None,
                            },
                            file: FindingLocation {
                                path: path.clone(),
                                line_start: m.get("line").and_then(Value::as_u64).unwrap_or(0) as u32,
                                line_end: None,
                            },
                            evidence: Evidence { code_snippet: None },
                        }
                    })
            })
            .collect();

        let status = if findings.is_empty() { ToolStatus::NoIssues } else { ToolStatus::Success };
        let sarif = Some(crate::sarif::findings_to_sarif("eslint", &findings));
        ToolOutcome {
            record: record("eslint", true, status, findings.len() as u32, duration_seconds, None),
            findings,
            sarif,
        }
    }
}

/// npm audit. Exit codes: 0 no vulnerabilities, 1 vulnerabilities found.
pub struct NpmAuditParser;

impl ToolParser for NpmAuditParser {
    fn parse(&self, raw: &RawToolOutput, exit_code: i32, duration_seconds: f64) -> ToolOutcome {
        if exit_code >= 2 {
            return invocation_failed("npm-audit", duration_seconds, format!("npm audit exited {exit_code}"));
        }
        let Some(json) = raw.as_json() else {
            return invocation_failed("npm-audit", duration_seconds, "expected JSON output".into());
        };
        let findings: Vec<Finding> = json
            .get("vulnerabilities")
            .and_then(Value::as_object)
            .into_iter()
            .flatten()
            .map(|(package, v)| Finding {
                tool: "npm-audit".to_string(),
                category: FindingCategory::Security,
                severity: severity_or_info_with_warning(
                    "npm-audit",
                    v.get("severity").and_then(Value::as_str).unwrap_or("info"),
                ),
                rule_id: package.clone(),
                message: FindingMessage {
                    title: format!("{package} has a known vulnerability"),
                    description: v
                        .get("via")
                        .and_then(Value::as_array)
                        .map(|via| format!("{via:?}"))
                        .unwrap_or_default(),
                    solution: v.get("fixAvailable").map(|v| format!("{v:?}")),
                },
                file: FindingLocation {
                    path: "package.json".to_string(),
                    line_start: 0,
                    line_end: None,
                },
                evidence: Evidence { code_snippet: None },
            })
            .collect();

        let status = if findings.is_empty() { ToolStatus::NoIssues } else { ToolStatus::Success };
        let sarif = Some(crate::sarif::findings_to_sarif("npm-audit", &findings));
        ToolOutcome {
            record: record("npm-audit", true, status, findings.len() as u32, duration_seconds, None),
            findings,
            sarif,
        }
    }
}

/// OWASP ZAP baseline scan. Its own exit codes (0 pass, 1 warnings, 2 alert
/// failures) all represent successful scans with varying outcomes; only a
/// process-level crash (output isn't parseable JSON) is a tool failure.
pub struct ZapBaselineParser;

impl ToolParser for ZapBaselineParser {
    fn parse(&self, raw: &RawToolOutput, exit_code: i32, duration_seconds: f64) -> ToolOutcome {
        if exit_code > 2 {
            return invocation_failed("zap-baseline", duration_seconds, format!("zap-baseline exited {exit_code}"));
        }
        let Some(json) = raw.as_json() else {
            return invocation_failed("zap-baseline", duration_seconds, "expected JSON output".into());
        };
        let findings: Vec<Finding> = json
            .get("site")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .flat_map(|site| site.get("alerts").and_then(Value::as_array).cloned().unwrap_or_default())
            .map(|alert| {
                let riskdesc = alert.get("riskdesc").and_then(Value::as_str).unwrap_or("Informational");
                let risk_word = riskdesc.split_whitespace().next().unwrap_or("info");
                Finding {
                    tool: "zap-baseline".to_string(),
                    category: FindingCategory::Security,
                    severity: severity_or_info_with_warning("zap-baseline", risk_word),
                    rule_id: alert.get("pluginid").and_then(Value::as_str).unwrap_or("unknown").to_string(),
                    message: FindingMessage {
                        title: alert.get("name").and_then(Value::as_str).unwrap_or("").to_string(),
                        description: alert.get("desc").and_then(Value::as_str).unwrap_or("").to_string(),
                        solution: alert.get("solution").and_then(Value::as_str).map(str::to_string),
                    },
                    file: FindingLocation {
                        path: alert
                            .get("instances")
                            .and_then(Value::as_array)
                            .and_then(|i| i.first())
                            .and_then(|i| i.get("uri"))
                            .and_then(Value::as_str)
                            .unwrap_or("")
                            .to_string(),
                        line_start: 0,
                        line_end: None,
                    },
                    evidence: Evidence { code_snippet: None },
                }
            })
            .collect();

        let status = if findings.is_empty() { ToolStatus::NoIssues } else { ToolStatus::Success };
        let sarif = Some(crate::sarif::findings_to_sarif("zap-baseline", &findings));
        ToolOutcome {
            record: record("zap-baseline", true, status, findings.len() as u32, duration_seconds, None),
            findings,
            sarif,
        }
    }
}

/// Locust-style load summary: reports performance findings for endpoints
/// whose latency or failure rate crosses a fixed threshold, rather than
/// per-file code findings.
pub struct LocustParser;

const SLOW_ENDPOINT_THRESHOLD_MS: f64 = 1000.0;

impl ToolParser for LocustParser {
    fn parse(&self, raw: &RawToolOutput, exit_code: i32, duration_seconds: f64) -> ToolOutcome {
        if exit_code != 0 {
            return invocation_failed("locust", duration_seconds, format!("locust exited {exit_code}"));
        }
        let Some(json) = raw.as_json() else {
            return invocation_failed("locust", duration_seconds, "expected JSON output".into());
        };
        let findings: Vec<Finding> = json
            .get("stats")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|stat| {
                let avg_ms = stat.get("avg_response_time").and_then(Value::as_f64).unwrap_or(0.0);
                let failures = stat.get("num_failures").and_then(Value::as_u64).unwrap_or(0);
                let name = stat.get("name").and_then(Value::as_str).unwrap_or("unknown").to_string();

                if failures == 0 && avg_ms < SLOW_ENDPOINT_THRESHOLD_MS {
                    return None;
                }

                Some(Finding {
                    tool: "locust".to_string(),
                    category: FindingCategory::Performance,
                    severity: if failures > 0 { Severity::High } else { Severity::Medium },
                    rule_id: "slow-or-failing-endpoint".to_string(),
                    message: FindingMessage {
                        title: format!("{name}: {avg_ms:.0}ms avg, {failures} failures"),
                        description: format!(
                            "endpoint '{name}' averaged {avg_ms:.0}ms with {failures} failed requests"
                        ),
                        solution: None,
                    },
                    file: FindingLocation {
                        path: name,
                        line_start: 0,
                        line_end: None,
                    },
                    evidence: Evidence { code_snippet: None },
                })
            })
            .collect();

        let status = if findings.is_empty() { ToolStatus::NoIssues } else { ToolStatus::Success };
        let sarif = Some(crate::sarif::findings_to_sarif("locust", &findings));
        ToolOutcome {
            record: record("locust", true, status, findings.len() as u32, duration_seconds, None),
            findings,
            sarif,
        }
    }
}

/// AI-reviewer output is always JSON and carries its own severity and
/// category per finding.
pub struct AiReviewParser;

impl ToolParser for AiReviewParser {
    fn parse(&self, raw: &RawToolOutput, exit_code: i32, duration_seconds: f64) -> ToolOutcome {
        if exit_code != 0 {
            return invocation_failed("ai-review", duration_seconds, format!("ai-review exited {exit_code}"));
        }
        let Some(json) = raw.as_json() else {
            return invocation_failed("ai-review", duration_seconds, "expected JSON output".into());
        };
        let findings: Vec<Finding> = json
            .get("findings")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .map(|f| Finding {
                tool: "ai-review".to_string(),
                category: match f.get("category").and_then(Value::as_str) {
                    Some("security") => FindingCategory::Security,
                    Some("performance") => FindingCategory::Performance,
                    _ => FindingCategory::CodeQuality,
                },
                severity: severity_or_info_with_warning(
                    "ai-review",
                    f.get("severity").and_then(Value::as_str).unwrap_or("info"),
                ),
                rule_id: "ai-review".to_string(),
                message: FindingMessage {
                    title: f.get("title").and_then(Value::as_str).unwrap_or("").to_string(),
                    description: f.get("description").and_then(Value::as_str).unwrap_or("").to_string(),
                    solution: f.get("recommendation").and_then(Value::as_str).map(str::to_string),
                },
                file: FindingLocation {
                    path: f.get("file").and_then(Value::as_str).unwrap_or("").to_string(),
                    line_start: f.get("line").and_then(Value::as_u64).unwrap_or(0) as u32,
                    line_end: None,
                },
                evidence: Evidence { code_snippet: None },
            })
            .collect();

        let status = if findings.is_empty() { ToolStatus::NoIssues } else { ToolStatus::Success };
        let sarif = Some(crate::sarif::findings_to_sarif("ai-review", &findings));
        ToolOutcome {
            record: record("ai-review", true, status, findings.len() as u32, duration_seconds, None),
            findings,
            sarif,
        }
    }
}

pub fn default_registry() -> ToolParserRegistry {
    let mut registry = ToolParserRegistry::new();
    registry
        .register("bandit", Box::new(BanditParser))
        .register("pylint", Box::new(PylintParser))
        .register("mypy", Box::new(MypyParser))
        .register("safety", Box::new(SafetyParser))
        .register("semgrep", Box::new(SemgrepParser))
        .register("eslint", Box::new(EslintParser))
        .register("npm-audit", Box::new(NpmAuditParser))
        .register("zap-baseline", Box::new(ZapBaselineParser))
        .register("locust", Box::new(LocustParser))
        .register("ai-review", Box::new(AiReviewParser));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bandit_maps_clean_run_to_no_issues() {
        let raw = RawToolOutput::Json(json!({"results": []}));
        let outcome = BanditParser.parse(&raw, 0, 0.4);
        assert_eq!(outcome.record.status, ToolStatus::NoIssues);
        assert!(outcome.findings.is_empty());
    }

    #[test]
    fn bandit_maps_exit_one_to_success_with_findings() {
        let raw = RawToolOutput::Json(json!({
            "results": [{
                "filename": "app.py",
                "line_number": 10,
                "issue_severity": "HIGH",
                "issue_text": "hardcoded password",
                "test_id": "B105",
                "test_name": "hardcoded_password_string",
                "code": "pw = 'secret'",
            }]
        }));
        let outcome = BanditParser.parse(&raw, 1, 0.4);
        assert_eq!(outcome.record.status, ToolStatus::Success);
        assert_eq!(outcome.findings.len(), 1);
        assert_eq!(outcome.findings[0].severity, Severity::High);
    }

    #[test]
    fn bandit_invocation_error_is_reported_failed() {
        let raw = RawToolOutput::ExitCodeOnly(2);
        let outcome = BanditParser.parse(&raw, 2, 0.1);
        assert_eq!(outcome.record.status, ToolStatus::Failed);
        assert!(outcome.record.error.is_some());
    }

    #[test]
    fn pylint_usage_error_bit_is_a_failure_but_warning_bit_is_not() {
        let clean = PylintParser.parse(&RawToolOutput::Json(json!([])), 4, 0.2);
        assert_eq!(clean.record.status, ToolStatus::NoIssues);

        let failed = PylintParser.parse(&RawToolOutput::ExitCodeOnly(32), 32, 0.2);
        assert_eq!(failed.record.status, ToolStatus::Failed);
    }

    #[test]
    fn mypy_parses_error_and_note_lines() {
        let text = "app.py:12: error: Incompatible types  [assignment]\napp.py:20: note: see docs";
        let outcome = MypyParser.parse(&RawToolOutput::Text(text.to_string()), 1, 0.3);
        assert_eq!(outcome.findings.len(), 2);
        assert_eq!(outcome.findings[0].severity, Severity::High);
        assert_eq!(outcome.findings[0].rule_id, "assignment");
        assert_eq!(outcome.findings[1].severity, Severity::Info);
    }

    #[test]
    fn eslint_maps_severity_two_to_high() {
        let raw = RawToolOutput::Json(json!([{
            "filePath": "index.js",
            "messages": [{"ruleId": "no-unused-vars", "severity": 2, "message": "unused", "line": 3}]
        }]));
        let outcome = EslintParser.parse(&raw, 1, 0.2);
        assert_eq!(outcome.findings[0].severity, Severity::High);
    }

    #[test]
    fn locust_skips_healthy_endpoints() {
        let raw = RawToolOutput::Json(json!({
            "stats": [
                {"name": "/health", "avg_response_time": 50.0, "num_failures": 0},
                {"name": "/slow", "avg_response_time": 2000.0, "num_failures": 0},
            ]
        }));
        let outcome = LocustParser.parse(&raw, 0, 5.0);
        assert_eq!(outcome.findings.len(), 1);
        assert_eq!(outcome.findings[0].file.path, "/slow");
    }

    #[test]
    fn bandit_findings_carry_an_extractable_sarif_document() {
        let raw = RawToolOutput::Json(json!({
            "results": [{
                "filename": "app.py",
                "line_number": 10,
                "issue_severity": "HIGH",
                "issue_text": "hardcoded password",
                "test_id": "B105",
                "test_name": "hardcoded_password_string",
            }]
        }));
        let outcome = BanditParser.parse(&raw, 1, 0.4);
        let sarif = outcome.sarif.expect("successful runs must carry a SARIF document");
        assert_eq!(sarif["runs"][0]["results"][0]["ruleId"], "B105");
    }

    #[test]
    fn invocation_failure_carries_no_sarif_document() {
        let outcome = BanditParser.parse(&RawToolOutput::ExitCodeOnly(2), 2, 0.1);
        assert!(outcome.sarif.is_none());
    }

    #[test]
    fn default_registry_has_all_ten_tools() {
        let registry = default_registry();
        for tool in [
            "bandit", "pylint", "mypy", "safety", "semgrep", "eslint", "npm-audit", "zap-baseline",
            "locust", "ai-review",
        ] {
            assert!(registry.is_registered(tool), "missing parser for {tool}");
        }
    }
}
