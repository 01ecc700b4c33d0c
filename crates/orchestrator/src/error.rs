#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Pipeline(#[from] database::PipelineStoreError),
    #[error(transparent)]
    Task(#[from] database::TaskStoreError),
    #[error("pipeline {0} not found")]
    PipelineNotFound(uuid::Uuid),
    #[error("step spec names are not unique within the pipeline")]
    DuplicateStepName,
    #[error("step {0:?} depends on unknown step {1:?}")]
    UnknownDependency(String, String),
}
