//! Shared dependency bundle handed to every Axum handler via `State`.
//!
//! Modernises the teacher's `Extension(pool): Extension<PgPool>` pattern
//! (`orchestration::api`) to a single `State<Arc<AppState>>` extractor —
//! same idea, one clone instead of one per store.

use std::sync::Arc;

use database::{PipelineStore, ResultStore, SubjectApplicationStore, TaskStore};
use executor::{PoolRegistry, Reaper, SystemClock, TaskExecutor};
use orchestrator::PipelineOrchestrator;

use crate::maintenance::MaintenanceRunner;

pub struct AppState {
    pub tasks: TaskStore,
    pub pipelines: PipelineStore,
    pub results: ResultStore,
    pub subject_applications: SubjectApplicationStore,
    pub pools: Arc<PoolRegistry>,
    pub executor: Arc<TaskExecutor<SystemClock>>,
    pub reaper: Arc<Reaper<SystemClock>>,
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub maintenance: Arc<MaintenanceRunner>,
}
