//! Dual-write result persistence: the database row is the system of
//! record, the on-disk layout under `results/{model}/app{N}/task_{id}/` is
//! a best-effort mirror for humans and tooling that want files rather than
//! database rows. A file-write failure never fails the task; it only
//! downgrades `has_result_files` and is logged as a warning. The
//! reconciliation sweep later finds rows with `has_result_files = false`
//! and retries the file write from the already-committed summary.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use contracts::finding::Finding;
use contracts::replica::AnalyzerKind;
use contracts::subject_application::AppIdentity;
use contracts::task::{AnalysisTask, ResultSummary, SubtaskOutcome, TaskState, ToolExecutionRecord};
use normalizer::registry::ToolOutcome;
use normalizer::sarif::{consolidate, consolidated_relative_path, SarifReference};

use crate::task_store::{TaskStore, TaskStoreError};

#[derive(Debug, thiserror::Error)]
pub enum ResultStoreError {
    #[error(transparent)]
    Task(#[from] TaskStoreError),
}

/// Outcome of the best-effort filesystem mirror. Never bubbles up as an
/// error from [`ResultStore::persist`]; it is recorded and logged instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileWriteOutcome {
    Written,
    /// Worth retrying from the reconciliation sweep: disk full, permission
    /// race, parent directory briefly unavailable.
    FailedRecoverable(String),
    /// Retrying with the same summary would fail identically; the sweep
    /// should not waste a cycle on it without intervention.
    FailedFatal(String),
}

impl FileWriteOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, FileWriteOutcome::Written)
    }
}

/// One analyzer kind's contribution to a task's result: the per-tool
/// outcomes a replica returned, already normalised.
pub struct ServiceResult {
    pub kind: AnalyzerKind,
    pub tools: BTreeMap<String, ToolOutcome>,
}

#[derive(Serialize)]
struct ServiceSnapshot {
    kind: &'static str,
    tools: BTreeMap<String, ToolRecordSnapshot>,
}

#[derive(Serialize)]
struct ToolRecordSnapshot {
    #[serde(flatten)]
    record: ToolExecutionRecord,
    findings: Vec<Finding>,
    sarif: Option<SarifReference>,
}

#[derive(Serialize)]
struct Manifest {
    task_id: Uuid,
    files: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct Payload {
    task_id: Uuid,
    app_model_identifier: String,
    app_number: u32,
    kind: String,
    state: String,
    summary: ResultSummary,
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Rolls every service's tool outcomes into the compact summary persisted
/// on the task row and mirrored into `payload.json`.
pub fn summarize(services: &[ServiceResult], subtasks: Vec<SubtaskOutcome>) -> ResultSummary {
    let mut total_findings = 0u32;
    let mut findings_by_severity: BTreeMap<String, u32> = BTreeMap::new();
    let mut tools = Vec::new();

    for service in services {
        for (tool, outcome) in &service.tools {
            tools.push(tool.clone());
            total_findings += outcome.findings.len() as u32;
            for finding in &outcome.findings {
                let key = format!("{:?}", finding.severity).to_ascii_lowercase();
                *findings_by_severity.entry(key).or_insert(0) += 1;
            }
        }
    }
    tools.sort();
    tools.dedup();

    ResultSummary {
        total_findings,
        findings_by_severity,
        tools,
        subtasks,
        has_result_files: false,
    }
}

#[derive(Clone)]
pub struct ResultStore {
    tasks: TaskStore,
    results_root: PathBuf,
}

impl ResultStore {
    pub fn new(pool: PgPool, results_root: impl Into<PathBuf>) -> Self {
        Self {
            tasks: TaskStore::new(pool),
            results_root: results_root.into(),
        }
    }

    fn task_dir(&self, identity: &AppIdentity, task_id: Uuid) -> PathBuf {
        self.results_root
            .join(&identity.model_identifier)
            .join(format!("app{}", identity.app_number))
            .join(format!("task_{task_id}"))
    }

    /// Writes the DB row first (summary always lands, regardless of what
    /// happens to the filesystem mirror below), then attempts the on-disk
    /// mirror. A file-write failure is recorded as a warning and reflected
    /// only in `has_result_files`; it never turns a successful task into a
    /// failed one.
    pub async fn persist(
        &self,
        task: &AnalysisTask,
        state: TaskState,
        services: &[ServiceResult],
        subtasks: Vec<SubtaskOutcome>,
        error_detail: Option<String>,
    ) -> Result<(AnalysisTask, FileWriteOutcome), ResultStoreError> {
        let mut summary = summarize(services, subtasks);

        let identity = AppIdentity::new(task.app_model_identifier.clone(), task.app_number);
        let outcome = self.write_files(&identity, task.id, task, state, &summary, services);
        summary.has_result_files = outcome.is_written();

        if !outcome.is_written() {
            if let FileWriteOutcome::FailedRecoverable(reason) = &outcome {
                tracing::warn!(task_id = %task.id, reason, "result file mirror failed, will retry via reconciliation sweep");
            } else if let FileWriteOutcome::FailedFatal(reason) = &outcome {
                tracing::warn!(task_id = %task.id, reason, "result file mirror failed fatally, not retriable");
            }
        }

        let updated = self
            .tasks
            .complete(task.id, state, &summary, summary.has_result_files, error_detail)
            .await?;
        Ok((updated, outcome))
    }

    fn write_files(
        &self,
        identity: &AppIdentity,
        task_id: Uuid,
        task: &AnalysisTask,
        state: TaskState,
        summary: &ResultSummary,
        services: &[ServiceResult],
    ) -> FileWriteOutcome {
        let dir = self.task_dir(identity, task_id);
        if let Err(err) = std::fs::create_dir_all(&dir) {
            return FileWriteOutcome::FailedRecoverable(err.to_string());
        }

        let mut manifest_files = BTreeMap::new();

        let payload = Payload {
            task_id,
            app_model_identifier: task.app_model_identifier.clone(),
            app_number: task.app_number,
            kind: format!("{:?}", task.kind).to_ascii_lowercase(),
            state: format!("{:?}", state).to_ascii_lowercase(),
            summary: summary.clone(),
        };
        match write_json(&dir, "payload.json", &payload) {
            Ok(hash) => {
                manifest_files.insert("payload.json".to_string(), hash);
            }
            Err(outcome) => return outcome,
        }

        for service in services {
            let mut service_tools = BTreeMap::new();
            let mut service_sarif_documents = Vec::new();

            for (tool, outcome) in &service.tools {
                let sarif = if let Some(document) = &outcome.sarif {
                    let reference = SarifReference::new(service.kind.as_str(), tool);
                    if let Err(outcome) = write_json_raw(&dir, &reference.sarif_file, document) {
                        return outcome;
                    }
                    manifest_files.insert(reference.sarif_file.clone(), sha256_hex(document.to_string().as_bytes()));
                    service_sarif_documents.push(document.clone());
                    Some(reference)
                } else {
                    None
                };

                service_tools.insert(
                    tool.clone(),
                    ToolRecordSnapshot {
                        record: outcome.record.clone(),
                        findings: outcome.findings.clone(),
                        sarif,
                    },
                );
            }

            let snapshot = ServiceSnapshot {
                kind: service.kind.as_str(),
                tools: service_tools,
            };
            let filename = format!("services/{}.json", service.kind.as_str());
            match write_json(&dir, &filename, &snapshot) {
                Ok(hash) => {
                    manifest_files.insert(filename, hash);
                }
                Err(outcome) => return outcome,
            }

            if !service_sarif_documents.is_empty() {
                let consolidated = consolidate(&service_sarif_documents);
                let relative = consolidated_relative_path(service.kind.as_str());
                if let Err(outcome) = write_json_raw(&dir, &relative, &consolidated) {
                    return outcome;
                }
                manifest_files.insert(relative.clone(), sha256_hex(consolidated.to_string().as_bytes()));
            }
        }

        let manifest = Manifest {
            task_id,
            files: manifest_files,
        };
        if let Err(outcome) = write_json(&dir, "manifest.json", &manifest) {
            return outcome;
        }

        FileWriteOutcome::Written
    }

    /// Finds completed tasks whose filesystem mirror is missing and
    /// rewrites it from the already-persisted summary. Idempotent: running
    /// it twice in a row reproduces the same manifest, since every file is
    /// rewritten wholesale rather than appended to.
    pub async fn reconcile(&self) -> Result<usize, ResultStoreError> {
        let tasks = self.tasks.find_missing_result_files().await?;
        let mut backfilled = 0;
        for task in tasks {
            let identity = AppIdentity::new(task.app_model_identifier.clone(), task.app_number);
            let Some(summary) = &task.summary else {
                continue;
            };
            let dir = self.task_dir(&identity, task.id);
            if std::fs::create_dir_all(&dir).is_err() {
                continue;
            }
            let payload = Payload {
                task_id: task.id,
                app_model_identifier: task.app_model_identifier.clone(),
                app_number: task.app_number,
                kind: format!("{:?}", task.kind).to_ascii_lowercase(),
                state: format!("{:?}", task.state).to_ascii_lowercase(),
                summary: summary.clone(),
            };
            if write_json(&dir, "payload.json", &payload).is_ok() {
                self.tasks.mark_result_files_written(task.id).await?;
                backfilled += 1;
            }
        }
        Ok(backfilled)
    }
}

fn write_json<T: Serialize>(dir: &Path, relative: &str, value: &T) -> Result<String, FileWriteOutcome> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| FileWriteOutcome::FailedFatal(e.to_string()))?;
    write_bytes(dir, relative, &bytes)
}

fn write_json_raw(dir: &Path, relative: &str, value: &serde_json::Value) -> Result<(), FileWriteOutcome> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| FileWriteOutcome::FailedFatal(e.to_string()))?;
    write_bytes(dir, relative, &bytes).map(|_| ())
}

fn write_bytes(dir: &Path, relative: &str, bytes: &[u8]) -> Result<String, FileWriteOutcome> {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| FileWriteOutcome::FailedRecoverable(e.to_string()))?;
    }
    std::fs::write(&path, bytes).map_err(|e| FileWriteOutcome::FailedRecoverable(e.to_string()))?;
    Ok(sha256_hex(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::task::{ToolStatus};

    fn sample_outcome(findings: usize) -> ToolOutcome {
        let findings: Vec<Finding> = (0..findings)
            .map(|_| Finding {
                tool: "bandit".to_string(),
                category: contracts::finding::FindingCategory::Security,
                severity: contracts::finding::Severity::High,
                rule_id: "B101".to_string(),
                message: contracts::finding::FindingMessage {
                    title: "assert used".to_string(),
                    description: "asserts are stripped in optimised bytecode".to_string(),
                    solution: None,
                },
                file: contracts::finding::FindingLocation {
                    path: "app.py".to_string(),
                    line_start: 10,
                    line_end: None,
                },
                evidence: contracts::finding::Evidence::default(),
            })
            .collect();

        ToolOutcome {
            record: ToolExecutionRecord {
                tool: "bandit".to_string(),
                executed: true,
                status: ToolStatus::Success,
                issues_found: findings.len() as u32,
                duration_seconds: 1.2,
                error: None,
            },
            sarif: Some(normalizer::sarif::findings_to_sarif("bandit", &findings)),
            findings,
        }
    }

    #[test]
    fn summarize_aggregates_findings_across_services() {
        let mut tools = BTreeMap::new();
        tools.insert("bandit".to_string(), sample_outcome(2));
        let services = vec![ServiceResult {
            kind: AnalyzerKind::Static,
            tools,
        }];

        let summary = summarize(&services, vec![]);
        assert_eq!(summary.total_findings, 2);
        assert_eq!(summary.findings_by_severity.get("high"), Some(&2));
        assert_eq!(summary.tools, vec!["bandit".to_string()]);
        assert!(!summary.has_result_files);
    }

    #[test]
    fn write_files_produces_a_manifest_and_payload_on_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ResultStore::new(
            sqlx::PgPool::connect_lazy("postgres://localhost/irrelevant").unwrap(),
            tmp.path(),
        );

        let mut tools = BTreeMap::new();
        tools.insert("bandit".to_string(), sample_outcome(1));
        let services = vec![ServiceResult {
            kind: AnalyzerKind::Static,
            tools,
        }];
        let task = AnalysisTask::new(
            "model",
            1,
            contracts::task::AnalysisKind::Static,
            contracts::task::ToolSelection::new(["bandit".to_string()]),
            0,
        );
        let summary = summarize(&services, vec![]);
        let identity = AppIdentity::new(task.app_model_identifier.clone(), task.app_number);

        let outcome = store.write_files(&identity, task.id, &task, TaskState::Completed, &summary, &services);
        assert_eq!(outcome, FileWriteOutcome::Written);

        let dir = store.task_dir(&identity, task.id);
        assert!(dir.join("payload.json").exists());
        assert!(dir.join("manifest.json").exists());
        assert!(dir.join("services/static.json").exists());
    }

    #[test]
    fn write_files_extracts_per_tool_and_consolidated_sarif_without_embedding_it_in_the_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ResultStore::new(
            sqlx::PgPool::connect_lazy("postgres://localhost/irrelevant").unwrap(),
            tmp.path(),
        );

        let mut tools = BTreeMap::new();
        tools.insert("bandit".to_string(), sample_outcome(1));
        let services = vec![ServiceResult {
            kind: AnalyzerKind::Static,
            tools,
        }];
        let task = AnalysisTask::new(
            "model",
            1,
            contracts::task::AnalysisKind::Static,
            contracts::task::ToolSelection::new(["bandit".to_string()]),
            0,
        );
        let summary = summarize(&services, vec![]);
        let identity = AppIdentity::new(task.app_model_identifier.clone(), task.app_number);

        let outcome = store.write_files(&identity, task.id, &task, TaskState::Completed, &summary, &services);
        assert_eq!(outcome, FileWriteOutcome::Written);

        let dir = store.task_dir(&identity, task.id);
        assert!(dir.join("sarif/static_bandit.sarif.json").exists());
        assert!(dir.join("sarif/static_consolidated.sarif.json").exists());

        let snapshot: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join("services/static.json")).unwrap()).unwrap();
        let bandit_entry = &snapshot["tools"]["bandit"];
        assert_eq!(bandit_entry["sarif"]["sarif_file"], "sarif/static_bandit.sarif.json");
        assert!(bandit_entry["sarif"].get("runs").is_none(), "snapshot must reference the SARIF file, not embed it");
    }

    #[test]
    fn reconcile_is_idempotent_on_the_same_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ResultStore::new(
            sqlx::PgPool::connect_lazy("postgres://localhost/irrelevant").unwrap(),
            tmp.path(),
        );
        let task = AnalysisTask::new(
            "model",
            1,
            contracts::task::AnalysisKind::Static,
            contracts::task::ToolSelection::new(["bandit".to_string()]),
            0,
        );
        let identity = AppIdentity::new(task.app_model_identifier.clone(), task.app_number);
        let summary = summarize(&[], vec![]);

        let first = store.write_files(&identity, task.id, &task, TaskState::Completed, &summary, &[]);
        let second = store.write_files(&identity, task.id, &task, TaskState::Completed, &summary, &[]);
        assert_eq!(first, FileWriteOutcome::Written);
        assert_eq!(second, FileWriteOutcome::Written);
    }
}
