//! Per-target serialization: concurrent build/start against the same
//! `(model, app_number)` is rejected rather than silently interleaved,
//! since two simultaneous Compose invocations against the same project
//! name corrupt each other's state.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Default)]
pub struct TargetLocks {
    locks: Arc<DashMap<(String, i32), Arc<Mutex<()>>>>,
}

impl TargetLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, model_identifier: &str, app_number: i32) -> Arc<Mutex<()>> {
        self.locks
            .entry((model_identifier.to_string(), app_number))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Returns `None` immediately if another operation already holds the
    /// lock for this target, rather than queueing behind it — the caller
    /// surfaces this as a clear rejection instead of an unexplained stall.
    pub async fn try_acquire(
        &self,
        model_identifier: &str,
        app_number: i32,
    ) -> Option<OwnedMutexGuard<()>> {
        let lock = self.lock_for(model_identifier, app_number);
        lock.try_lock_owned().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_for_same_target_is_rejected() {
        let locks = TargetLocks::new();
        let _guard = locks.try_acquire("model", 1).await.expect("first acquire succeeds");
        assert!(locks.try_acquire("model", 1).await.is_none());
    }

    #[tokio::test]
    async fn different_targets_do_not_contend() {
        let locks = TargetLocks::new();
        let _a = locks.try_acquire("model", 1).await.expect("first target");
        let _b = locks.try_acquire("model", 2).await.expect("second target");
    }

    #[tokio::test]
    async fn lock_is_available_again_after_guard_drops() {
        let locks = TargetLocks::new();
        {
            let _guard = locks.try_acquire("model", 1).await.unwrap();
        }
        assert!(locks.try_acquire("model", 1).await.is_some());
    }
}
