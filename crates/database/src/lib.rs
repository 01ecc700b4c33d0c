//! Postgres-backed persistence: task claiming, pipeline bookkeeping, the
//! subject application registry, and the dual-write result store.

pub mod client;
pub mod models;
pub mod pipeline_store;
pub mod queries;
pub mod result_store;
pub mod subject_application_store;
pub mod task_store;

pub use client::{DatabaseClient, DatabaseConfig, DatabaseError};
pub use pipeline_store::{PipelineStore, PipelineStoreError};
pub use result_store::{FileWriteOutcome, ResultStore, ResultStoreError, ServiceResult};
pub use subject_application_store::{SubjectApplicationStore, SubjectApplicationStoreError};
pub use task_store::{TaskStore, TaskStoreError};
