use thiserror::Error;

#[derive(Debug, Error)]
pub enum DockerDriverError {
    #[error("compose invocation failed: {0}")]
    ComposeFailed(String),

    #[error("compose invocation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("another build/start is already in progress for this application")]
    ConcurrentOperationRejected,

    #[error("failed to spawn subprocess: {0}")]
    Spawn(#[from] std::io::Error),
}
