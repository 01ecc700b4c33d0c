//! Typed environment-variable configuration surface (`spec.md` §6),
//! validated at process start with the `validator` crate the way the
//! teacher's `config::config::AppConfig` validates its own settings tree.

pub mod app_config;
pub mod environment;
pub mod error;
pub mod loader;

pub use app_config::{AnalyzerEndpoints, AppConfig, DockerSettings, ExecutorSettings, MaintenanceSettings, ServerSettings};
pub use environment::Environment;
pub use error::ConfigError;
