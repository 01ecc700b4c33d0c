//! Stuck-task reaper: periodically finds tasks that have sat in `RUNNING`
//! longer than a liveness threshold and reclaims them, so an executor that
//! died mid-task never leaves it orphaned forever.

use chrono::Duration as ChronoDuration;
use std::time::Duration;

use contracts::task::{AnalysisTask, TaskState};
use database::{TaskStore, TaskStoreError};

use crate::clock::Clock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReapAction {
    /// Returned to `PENDING` with `stuck_retries` incremented.
    Requeued,
    /// `stuck_retries` exceeded the soft cap, or the hard threshold was
    /// exceeded regardless of retry count.
    Failed,
}

#[derive(Debug, Clone)]
pub struct ReapReport {
    pub task_id: uuid::Uuid,
    pub action: ReapAction,
}

pub struct Reaper<C: Clock> {
    tasks: TaskStore,
    clock: C,
}

impl<C: Clock> Reaper<C> {
    pub fn new(tasks: TaskStore, clock: C) -> Self {
        Self { tasks, clock }
    }

    /// Soft threshold (default 15 minutes): requeue to `PENDING` with
    /// `stuck_retries` incremented, up to `soft_cap` (default 3) — beyond
    /// the cap it's `FAILED` with reason `stuck`. Hard threshold (default 2
    /// hours): `FAILED` immediately regardless of retry count, since a task
    /// stuck that long is not coming back no matter how many times it's
    /// requeued.
    pub async fn sweep(
        &self,
        soft_threshold: Duration,
        soft_cap: u32,
        hard_threshold: Duration,
    ) -> Result<Vec<ReapReport>, TaskStoreError> {
        let now = self.clock.now();
        let started_before = now - ChronoDuration::from_std(soft_threshold).expect("soft threshold fits in chrono::Duration");
        let stuck = self.tasks.find_stuck_running(started_before).await?;

        let mut reports = Vec::new();
        for task in stuck {
            reports.push(self.reap_one(&task, now, soft_cap, hard_threshold).await?);
        }
        Ok(reports)
    }

    async fn reap_one(
        &self,
        task: &AnalysisTask,
        now: chrono::DateTime<chrono::Utc>,
        soft_cap: u32,
        hard_threshold: Duration,
    ) -> Result<ReapReport, TaskStoreError> {
        let running_for = task
            .started_at
            .map(|started| now - started)
            .unwrap_or(ChronoDuration::zero());
        let hard_threshold = ChronoDuration::from_std(hard_threshold).expect("hard threshold fits in chrono::Duration");

        let action = decide(running_for, task.stuck_retries, soft_cap, hard_threshold);
        match action {
            ReapAction::Failed => {
                self.tasks.fail(task.id, "stuck").await?;
            }
            ReapAction::Requeued => {
                self.tasks.retry_as_pending(task.id, now, 0, 0, 1).await?;
            }
        }
        Ok(ReapReport {
            task_id: task.id,
            action,
        })
    }
}

/// Pure decision at the core of `reap_one`, pulled out so the soft-cap /
/// hard-threshold branching can be exercised directly without a store:
/// `FAILED` once the hard threshold is crossed regardless of retry count, or
/// once `stuck_retries` has already reached `soft_cap`; `Requeued` (with the
/// caller expected to increment `stuck_retries`) otherwise.
fn decide(running_for: ChronoDuration, stuck_retries: u32, soft_cap: u32, hard_threshold: ChronoDuration) -> ReapAction {
    if running_for >= hard_threshold || stuck_retries >= soft_cap {
        ReapAction::Failed
    } else {
        ReapAction::Requeued
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOFT_CAP: u32 = 3;

    fn hard_threshold() -> ChronoDuration {
        ChronoDuration::hours(2)
    }

    #[test]
    fn below_soft_cap_and_hard_threshold_requeues() {
        let running_for = ChronoDuration::minutes(16);
        assert_eq!(
            decide(running_for, 0, SOFT_CAP, hard_threshold()),
            ReapAction::Requeued
        );
    }

    #[test]
    fn soft_cap_already_reached_fails_instead_of_requeuing_again() {
        let running_for = ChronoDuration::minutes(16);
        assert_eq!(
            decide(running_for, SOFT_CAP, SOFT_CAP, hard_threshold()),
            ReapAction::Failed
        );
    }

    #[test]
    fn past_hard_threshold_fails_regardless_of_retry_count() {
        let running_for = ChronoDuration::hours(3);
        assert_eq!(
            decide(running_for, 0, SOFT_CAP, hard_threshold()),
            ReapAction::Failed
        );
    }

    #[test]
    fn hard_threshold_wins_even_one_stuck_retry_below_the_soft_cap() {
        // Both conditions are independently sufficient; a task that hasn't
        // exhausted its soft-cap retries must still fail once it's been
        // running longer than the hard threshold.
        let running_for = ChronoDuration::hours(2) + ChronoDuration::minutes(1);
        assert_eq!(
            decide(running_for, SOFT_CAP - 1, SOFT_CAP, hard_threshold()),
            ReapAction::Failed
        );
    }
}
