//! Typed configuration surface, assembled from the flat environment
//! namespace `spec.md` §6 enumerates and validated with the `validator`
//! crate, the way the teacher's `config::config::AppConfig` validates its
//! own (far larger) settings tree.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use crate::environment::Environment;
use crate::error::ConfigError;
use crate::loader::{env_bool, env_string, env_url_list, env_var_parsed};

/// Task executor tuning knobs — mirrors `executor::ExecutorConfig` field
/// for field so `server::main` can convert one into the other without any
/// lossy guessing.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ExecutorSettings {
    #[validate(range(min = 1, max = 3600))]
    pub poll_interval_seconds: u64,
    #[validate(range(min = 1, max = 86400))]
    pub task_timeout_seconds: u64,
    #[validate(range(min = 0, max = 20))]
    pub preflight_max_retries: u32,
    #[validate(range(min = 0, max = 20))]
    pub transient_failure_max_retries: u32,
    #[validate(range(min = 1, max = 3600))]
    pub analyzer_startup_timeout_seconds: u64,
    #[validate(range(min = 1, max = 86400))]
    pub static_analysis_timeout_seconds: u64,
    /// `AnalysisKind::Security` dispatches to the same static pool as
    /// `AnalysisKind::Static` (see `contracts::task::AnalysisKind::
    /// required_analyzer_kinds`), so this doesn't name a separate pool
    /// timeout — it overrides `static_analysis_timeout_seconds` when a
    /// deployment wants security-flavoured static runs held to a tighter
    /// deadline than plain static runs. Unset by default.
    pub security_analysis_timeout_seconds: Option<u64>,
    #[validate(range(min = 1, max = 86400))]
    pub dynamic_analysis_timeout_seconds: u64,
    #[validate(range(min = 1, max = 86400))]
    pub performance_analysis_timeout_seconds: u64,
    #[validate(range(min = 1, max = 86400))]
    pub ai_analysis_timeout_seconds: u64,
}

impl ExecutorSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_seconds)
    }

    pub fn analyzer_startup_timeout(&self) -> Duration {
        Duration::from_secs(self.analyzer_startup_timeout_seconds)
    }

    /// The static pool's effective timeout: `security_analysis_timeout_seconds`
    /// when set, `static_analysis_timeout_seconds` otherwise.
    pub fn static_timeout(&self) -> Duration {
        Duration::from_secs(
            self.security_analysis_timeout_seconds
                .unwrap_or(self.static_analysis_timeout_seconds),
        )
    }

    pub fn dynamic_timeout(&self) -> Duration {
        Duration::from_secs(self.dynamic_analysis_timeout_seconds)
    }

    pub fn performance_timeout(&self) -> Duration {
        Duration::from_secs(self.performance_analysis_timeout_seconds)
    }

    pub fn ai_timeout(&self) -> Duration {
        Duration::from_secs(self.ai_analysis_timeout_seconds)
    }
}

/// Docker driver tuning knobs (`spec.md` §4.4/§4.4.1).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DockerSettings {
    #[validate(range(min = 0, max = 20))]
    pub build_max_retries: u32,
    #[validate(range(min = 1, max = 3600))]
    pub health_check_timeout_seconds: u64,
    pub pre_build_cleanup: bool,
}

impl DockerSettings {
    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_secs(self.health_check_timeout_seconds)
    }
}

/// Comma-separated `host:port` endpoint lists per analyzer kind, handed
/// directly to `analyzer_pool::pool::AnalyzerPool::add_endpoint`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnalyzerEndpoints {
    pub static_endpoints: Vec<String>,
    pub dynamic_endpoints: Vec<String>,
    pub performance_endpoints: Vec<String>,
    pub ai_endpoints: Vec<String>,
}

/// Reaper and reconciliation-sweep tuning (`spec.md` §4.6 reaper, §4.5
/// reconciliation, §3 orphan grace period).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MaintenanceSettings {
    #[validate(range(min = 1, max = 86400))]
    pub reaper_interval_seconds: u64,
    #[validate(range(min = 1, max = 86400))]
    pub reaper_soft_threshold_seconds: u64,
    #[validate(range(min = 1, max = 100))]
    pub reaper_soft_cap: u32,
    #[validate(range(min = 1, max = 604800))]
    pub reaper_hard_threshold_seconds: u64,
    #[validate(range(min = 1, max = 86400))]
    pub reconciliation_interval_seconds: u64,
    #[validate(range(min = 1, max = 365))]
    pub missing_grace_period_days: u32,
}

impl MaintenanceSettings {
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_seconds)
    }

    pub fn reaper_soft_threshold(&self) -> Duration {
        Duration::from_secs(self.reaper_soft_threshold_seconds)
    }

    pub fn reaper_hard_threshold(&self) -> Duration {
        Duration::from_secs(self.reaper_hard_threshold_seconds)
    }

    pub fn reconciliation_interval(&self) -> Duration {
        Duration::from_secs(self.reconciliation_interval_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerSettings {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1, max = 65535))]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    pub environment: Environment,
    #[validate(length(min = 1, message = "DATABASE_URL must be set"))]
    pub database_url: String,
    #[validate(range(min = 1, max = 200))]
    pub database_max_connections: u32,
    #[validate(length(min = 1))]
    pub results_root: String,
    /// Where generated subject applications live on disk — the directory
    /// the maintenance sweep checks for existence per `(model, app_num)`
    /// to drive the missing/grace-period lifecycle (`spec.md` §3, §8
    /// scenario 6). Distinct from `results_root`, which holds this core's
    /// own output, not the subject under analysis.
    #[validate(length(min = 1))]
    pub subjects_root: String,
    #[validate(nested)]
    pub server: ServerSettings,
    #[validate(nested)]
    pub executor: ExecutorSettings,
    #[validate(nested)]
    pub docker: DockerSettings,
    pub analyzer_endpoints: AnalyzerEndpoints,
    #[validate(nested)]
    pub maintenance: MaintenanceSettings,
}

impl AppConfig {
    /// Reads and validates the process environment. Unrecognised variables
    /// are ignored, matching the teacher's `AppConfig::new()` convention of
    /// reading exactly the keys it knows about rather than rejecting an
    /// environment with extra noise in it.
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = match std::env::var("APP_ENVIRONMENT") {
            Ok(value) => Environment::from_str(&value)?,
            Err(_) => Environment::default(),
        };

        let config = AppConfig {
            database_url: env_string("DATABASE_URL", None).ok_or(ConfigError::MissingRequired("DATABASE_URL"))?,
            database_max_connections: env_var_parsed("DATABASE_MAX_CONNECTIONS", 20)?,
            results_root: env_string("RESULTS_ROOT", Some("./results")).expect("default provided"),
            subjects_root: env_string("SUBJECTS_ROOT", Some("./subjects")).expect("default provided"),
            server: ServerSettings {
                host: env_string("SERVER_HOST", Some("0.0.0.0")).expect("default provided"),
                port: env_var_parsed("SERVER_PORT", 8080)?,
            },
            executor: ExecutorSettings {
                poll_interval_seconds: env_var_parsed(
                    "TASK_POLL_INTERVAL",
                    environment.default_poll_interval_seconds(),
                )?,
                task_timeout_seconds: env_var_parsed("TASK_TIMEOUT", 1800)?,
                preflight_max_retries: env_var_parsed("PREFLIGHT_MAX_RETRIES", 3)?,
                transient_failure_max_retries: env_var_parsed("TRANSIENT_FAILURE_MAX_RETRIES", 3)?,
                analyzer_startup_timeout_seconds: env_var_parsed("ANALYZER_STARTUP_TIMEOUT", 60)?,
                static_analysis_timeout_seconds: env_var_parsed("STATIC_ANALYSIS_TIMEOUT", 1800)?,
                security_analysis_timeout_seconds: match std::env::var("SECURITY_ANALYSIS_TIMEOUT") {
                    Ok(v) => Some(v.parse().map_err(|_| ConfigError::InvalidValue("SECURITY_ANALYSIS_TIMEOUT"))?),
                    Err(_) => None,
                },
                dynamic_analysis_timeout_seconds: env_var_parsed("DYNAMIC_ANALYSIS_TIMEOUT", 1800)?,
                performance_analysis_timeout_seconds: env_var_parsed("PERFORMANCE_ANALYSIS_TIMEOUT", 1800)?,
                ai_analysis_timeout_seconds: env_var_parsed("AI_ANALYSIS_TIMEOUT", 2400)?,
            },
            docker: DockerSettings {
                build_max_retries: env_var_parsed("DOCKER_BUILD_MAX_RETRIES", 3)?,
                health_check_timeout_seconds: env_var_parsed("DOCKER_HEALTH_CHECK_TIMEOUT", 60)?,
                pre_build_cleanup: env_bool("DOCKER_PRE_BUILD_CLEANUP", true)?,
            },
            analyzer_endpoints: AnalyzerEndpoints {
                static_endpoints: env_url_list("STATIC_ANALYZER_ENDPOINTS"),
                dynamic_endpoints: env_url_list("DYNAMIC_ANALYZER_ENDPOINTS"),
                performance_endpoints: env_url_list("PERFORMANCE_ANALYZER_ENDPOINTS"),
                ai_endpoints: env_url_list("AI_ANALYZER_ENDPOINTS"),
            },
            maintenance: MaintenanceSettings {
                reaper_interval_seconds: env_var_parsed("REAPER_INTERVAL", 300)?,
                reaper_soft_threshold_seconds: env_var_parsed("REAPER_SOFT_THRESHOLD", 900)?,
                reaper_soft_cap: env_var_parsed("REAPER_SOFT_CAP", 3)?,
                reaper_hard_threshold_seconds: env_var_parsed("REAPER_HARD_THRESHOLD", 7200)?,
                reconciliation_interval_seconds: env_var_parsed("RECONCILIATION_INTERVAL", 3600)?,
                missing_grace_period_days: env_var_parsed("MISSING_GRACE_PERIOD_DAYS", 7)?,
            },
            environment,
        };

        config.validate().map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // `std::env::set_var` is process-global; serialise the env-mutating
    // tests so they don't stomp on each other when the test binary runs
    // them concurrently.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn with_minimal_env<F: FnOnce()>(f: F) {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("DATABASE_URL", "postgres://localhost/test");
        f();
        std::env::remove_var("DATABASE_URL");
    }

    #[test]
    fn loads_with_defaults_when_only_the_required_var_is_set() {
        with_minimal_env(|| {
            let config = AppConfig::from_env().expect("should load with defaults");
            assert_eq!(config.executor.task_timeout_seconds, 1800);
            assert_eq!(config.docker.pre_build_cleanup, true);
            assert!(config.analyzer_endpoints.static_endpoints.is_empty());
        });
    }

    #[test]
    fn missing_database_url_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("DATABASE_URL");
        assert!(matches!(AppConfig::from_env(), Err(ConfigError::MissingRequired("DATABASE_URL"))));
    }

    #[test]
    fn security_timeout_overrides_static_when_present() {
        with_minimal_env(|| {
            std::env::set_var("SECURITY_ANALYSIS_TIMEOUT", "900");
            let config = AppConfig::from_env().expect("should load");
            assert_eq!(config.executor.static_timeout(), Duration::from_secs(900));
            std::env::remove_var("SECURITY_ANALYSIS_TIMEOUT");
        });
    }

    #[test]
    fn endpoint_list_splits_on_commas_and_trims_whitespace() {
        with_minimal_env(|| {
            std::env::set_var("STATIC_ANALYZER_ENDPOINTS", "127.0.0.1:9001, 127.0.0.1:9002 ,127.0.0.1:9003");
            let config = AppConfig::from_env().expect("should load");
            assert_eq!(
                config.analyzer_endpoints.static_endpoints,
                vec!["127.0.0.1:9001", "127.0.0.1:9002", "127.0.0.1:9003"]
            );
            std::env::remove_var("STATIC_ANALYZER_ENDPOINTS");
        });
    }

    #[test]
    fn out_of_range_port_fails_validation() {
        with_minimal_env(|| {
            std::env::set_var("SERVER_PORT", "0");
            assert!(matches!(AppConfig::from_env(), Err(ConfigError::Validation(_))));
            std::env::remove_var("SERVER_PORT");
        });
    }
}
