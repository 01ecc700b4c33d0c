//! Process entry point: wires the stores, pools, executor, reaper, and
//! orchestrator together behind an Axum HTTP surface. The binary (`main.rs`)
//! owns process startup/shutdown; everything reusable from a test harness
//! lives in this library so integration tests can build an `AppState`
//! without going through `main`.

pub mod error;
pub mod maintenance;
pub mod routes;
pub mod state;

pub use error::ServerError;
pub use maintenance::{FilesystemSubjectDirResolver, MaintenanceConfig, MaintenanceReport, MaintenanceRunner, SubjectDirResolver};
pub use routes::router;
pub use state::AppState;
