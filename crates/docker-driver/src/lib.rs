//! Compose-based lifecycle driver for subject applications: build, start,
//! stop, rebuild, status and log retrieval, health polling, and per-target
//! serialization so two operations against the same application never race.

pub mod compose;
pub mod driver;
pub mod error;
pub mod health;
pub mod serialization;

pub use driver::{ApplicationStatus, ComposeDirResolver, ContainerStatus, DockerDriver};
pub use error::DockerDriverError;
pub use health::{ContainerHealth, ContainerHealthState, HealthWaitOutcome};
pub use serialization::TargetLocks;
