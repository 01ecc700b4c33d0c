//! Executor tuning knobs. The `config` crate assembles one of these from
//! the process environment; tests construct it directly with short
//! durations instead of going through real environment parsing.

use std::collections::BTreeMap;
use std::time::Duration;

use contracts::replica::AnalyzerKind;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// 10s in production, 2s in test mode per `spec.md` §4.6.
    pub poll_interval: Duration,
    pub preflight_max_retries: u32,
    pub preflight_backoff: Vec<Duration>,
    pub transient_max_retries: u32,
    pub overall_task_timeout: Duration,
    pub per_kind_timeout: BTreeMap<AnalyzerKind, Duration>,
    pub reaper_interval: Duration,
    pub reaper_soft_threshold: Duration,
    pub reaper_soft_cap: u32,
    pub reaper_hard_threshold: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        let mut per_kind_timeout = BTreeMap::new();
        per_kind_timeout.insert(AnalyzerKind::Static, Duration::from_secs(1800));
        per_kind_timeout.insert(AnalyzerKind::Dynamic, Duration::from_secs(1800));
        per_kind_timeout.insert(AnalyzerKind::Performance, Duration::from_secs(1800));
        per_kind_timeout.insert(AnalyzerKind::Ai, Duration::from_secs(2400));

        Self {
            poll_interval: Duration::from_secs(10),
            preflight_max_retries: 3,
            preflight_backoff: vec![
                Duration::from_secs(30),
                Duration::from_secs(60),
                Duration::from_secs(120),
            ],
            transient_max_retries: 3,
            overall_task_timeout: Duration::from_secs(1800),
            per_kind_timeout,
            reaper_interval: Duration::from_secs(5 * 60),
            reaper_soft_threshold: Duration::from_secs(15 * 60),
            reaper_soft_cap: 3,
            reaper_hard_threshold: Duration::from_secs(2 * 60 * 60),
        }
    }
}

impl ExecutorConfig {
    pub fn test_mode() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            ..Self::default()
        }
    }

    pub fn timeout_for(&self, kind: AnalyzerKind) -> Duration {
        self.per_kind_timeout
            .get(&kind)
            .copied()
            .unwrap_or(self.overall_task_timeout)
    }
}
