//! Task Executor: the poll → claim → pre-flight → dispatch → complete loop
//! that drives one `AnalysisTask` through to a terminal state.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use contracts::replica::AnalyzerKind;
use contracts::task::{AnalysisTask, SubtaskOutcome, TaskState};
use database::{ResultStore, TaskStore};

use crate::clock::Clock;
use crate::config::ExecutorConfig;
use crate::dispatch::{dispatch_kind, DispatchOutcome};
use crate::pools::PoolRegistry;

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Task(#[from] database::TaskStoreError),
    #[error(transparent)]
    Result(#[from] database::ResultStoreError),
}

/// Owns the poll loop and the set of tasks currently being dispatched by
/// this process. Multiple processes can run this loop against the same
/// database concurrently; `claim_next_pending`'s `FOR UPDATE SKIP LOCKED`
/// is what keeps them from claiming the same task twice.
pub struct TaskExecutor<C: Clock> {
    tasks: TaskStore,
    results: ResultStore,
    pools: Arc<PoolRegistry>,
    config: ExecutorConfig,
    clock: C,
    in_flight: DashMap<Uuid, CancellationToken>,
    shutdown: CancellationToken,
    idle: Notify,
}

impl<C: Clock> TaskExecutor<C> {
    pub fn new(tasks: TaskStore, results: ResultStore, pools: Arc<PoolRegistry>, config: ExecutorConfig, clock: C) -> Self {
        Self {
            tasks,
            results,
            pools,
            config,
            clock,
            in_flight: DashMap::new(),
            shutdown: CancellationToken::new(),
            idle: Notify::new(),
        }
    }

    /// Runs the poll loop until `stop()` is called. Intended to be spawned
    /// onto its own task by the caller; this method does not return until
    /// shutdown is requested.
    pub async fn run(&self) {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return,
                claimed = self.tasks.claim_next_pending() => {
                    match claimed {
                        Ok(Some(task)) => {
                            if let Err(error) = self.execute(task).await {
                                tracing::error!(%error, "task execution loop errored, continuing");
                            }
                        }
                        Ok(None) => {
                            self.idle.notify_waiters();
                            tokio::select! {
                                _ = self.shutdown.cancelled() => return,
                                _ = tokio::time::sleep(self.config.poll_interval) => {}
                            }
                        }
                        Err(error) => {
                            tracing::error!(%error, "failed to poll for pending tasks");
                            tokio::time::sleep(self.config.poll_interval).await;
                        }
                    }
                }
            }
        }
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Resolves the next time the poll loop finds no claimable task. Test
    /// harnesses use this to know when a submitted task has been picked up
    /// and processed, rather than polling `TaskStore::get` in a loop.
    pub async fn wait_idle(&self) {
        self.idle.notified().await;
    }

    /// Signals cancellation for `task_id`. If the task is currently being
    /// dispatched by this process, marks it `cancelling` and wakes the
    /// in-flight dispatch so it unwinds cooperatively. If it isn't (still
    /// `PENDING`, owned by another process, or already terminal), finalises
    /// directly — `TaskStore::cancel` is itself idempotent and a no-op on a
    /// terminal task.
    pub async fn request_cancel(&self, task_id: Uuid) -> Result<(), database::TaskStoreError> {
        let token = self.in_flight.get(&task_id).map(|entry| entry.clone());
        if let Some(token) = token {
            self.tasks.mark_cancelling(task_id).await?;
            token.cancel();
            Ok(())
        } else {
            self.tasks.cancel(task_id).await.map(|_| ())
        }
    }

    async fn execute(&self, task: AnalysisTask) -> Result<(), ExecutorError> {
        let required_kinds = task.kind.required_analyzer_kinds();

        if !self.preflight(&task, required_kinds).await? {
            return Ok(());
        }

        let token = CancellationToken::new();
        self.in_flight.insert(task.id, token.clone());
        let source_path = format!("/subjects/{}/app{}", task.app_model_identifier, task.app_number);

        let mut outcomes = Vec::with_capacity(required_kinds.len());
        for &kind in required_kinds {
            let outcome = match self.pools.pool(kind) {
                Some(pool) => {
                    dispatch_kind(
                        pool,
                        self.pools.transport(),
                        &task,
                        kind,
                        source_path.clone(),
                        self.config.timeout_for(kind),
                        &token,
                    )
                    .await
                }
                None => DispatchOutcome::SubtaskFailed(SubtaskOutcome {
                    kind,
                    state: TaskState::Failed,
                    failure_reason: Some("no pool registered for this analyzer kind".to_string()),
                }),
            };
            outcomes.push((kind, outcome));
        }
        self.in_flight.remove(&task.id);

        self.complete(&task, outcomes).await
    }

    /// Returns `Ok(true)` if every required kind has a healthy endpoint and
    /// dispatch should proceed; `Ok(false)` if the task was requeued or
    /// failed out and the caller should move on to the next claim.
    async fn preflight(&self, task: &AnalysisTask, required_kinds: &[AnalyzerKind]) -> Result<bool, ExecutorError> {
        match self.pools.all_healthy(required_kinds) {
            Ok(()) => Ok(true),
            Err(missing_kind) => {
                if task.preflight_retries >= self.config.preflight_max_retries {
                    self.tasks
                        .fail(task.id, format!("no healthy endpoint for {missing_kind} after pre-flight retries"))
                        .await?;
                    return Ok(false);
                }
                let delay = backoff_for(&self.config.preflight_backoff, task.preflight_retries);
                let not_before = self.clock.now() + chrono::Duration::from_std(delay).unwrap_or_default();
                self.tasks.retry_as_pending(task.id, not_before, 0, 1, 0).await?;
                Ok(false)
            }
        }
    }

    async fn complete(&self, task: &AnalysisTask, outcomes: Vec<(AnalyzerKind, DispatchOutcome)>) -> Result<(), ExecutorError> {
        if outcomes.iter().any(|(_, o)| matches!(o, DispatchOutcome::Cancelled)) {
            self.tasks.cancel(task.id).await?;
            return Ok(());
        }

        if outcomes.len() == 1 {
            let (_, outcome) = outcomes.into_iter().next().expect("len checked above");
            return self.complete_single(task, outcome).await;
        }

        self.complete_multi(task, outcomes).await
    }

    async fn complete_single(&self, task: &AnalysisTask, outcome: DispatchOutcome) -> Result<(), ExecutorError> {
        match outcome {
            DispatchOutcome::Success(service) => {
                self.results
                    .persist(task, TaskState::Completed, &[service], Vec::new(), None)
                    .await?;
            }
            DispatchOutcome::SubtaskFailed(sub) => {
                let reason = sub.failure_reason.clone();
                self.results
                    .persist(task, TaskState::Failed, &[], vec![sub], reason)
                    .await?;
            }
            DispatchOutcome::Transient(message) => {
                self.retry_or_fail_transient(task, message).await?;
            }
            DispatchOutcome::Cancelled => unreachable!("handled by complete()"),
        }
        Ok(())
    }

    async fn complete_multi(&self, task: &AnalysisTask, outcomes: Vec<(AnalyzerKind, DispatchOutcome)>) -> Result<(), ExecutorError> {
        let mut services = Vec::new();
        let mut subtasks = Vec::new();

        for (kind, outcome) in outcomes {
            match outcome {
                DispatchOutcome::Success(service) => services.push(service),
                DispatchOutcome::SubtaskFailed(sub) => subtasks.push(sub),
                DispatchOutcome::Transient(message) => subtasks.push(SubtaskOutcome {
                    kind,
                    state: TaskState::Failed,
                    failure_reason: Some(format!("transient: {message}")),
                }),
                DispatchOutcome::Cancelled => unreachable!("handled by complete()"),
            }
        }

        let state = if subtasks.is_empty() {
            TaskState::Completed
        } else if services.is_empty() {
            TaskState::Failed
        } else {
            TaskState::PartialSuccess
        };

        self.results.persist(task, state, &services, subtasks, None).await?;
        Ok(())
    }

    async fn retry_or_fail_transient(&self, task: &AnalysisTask, message: String) -> Result<(), ExecutorError> {
        if task.transient_retries >= self.config.transient_max_retries {
            self.tasks.fail(task.id, message).await?;
            return Ok(());
        }
        let delay = backoff_for(&self.config.preflight_backoff, task.transient_retries);
        let not_before = self.clock.now() + chrono::Duration::from_std(delay).unwrap_or_default();
        self.tasks.retry_as_pending(task.id, not_before, 1, 0, 0).await?;
        Ok(())
    }
}

fn backoff_for(schedule: &[std::time::Duration], attempt: u32) -> std::time::Duration {
    schedule
        .get(attempt as usize)
        .copied()
        .unwrap_or_else(|| schedule.last().copied().unwrap_or(std::time::Duration::from_secs(30)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_falls_back_to_last_entry_beyond_the_schedule() {
        let schedule = vec![std::time::Duration::from_secs(30), std::time::Duration::from_secs(60)];
        assert_eq!(backoff_for(&schedule, 0), std::time::Duration::from_secs(30));
        assert_eq!(backoff_for(&schedule, 1), std::time::Duration::from_secs(60));
        assert_eq!(backoff_for(&schedule, 5), std::time::Duration::from_secs(60));
    }
}
