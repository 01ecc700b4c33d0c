//! HTTP-facing error type: every handler returns `Result<_, ServerError>`
//! and this is the one place that maps the taxonomy in `spec.md` §7 onto
//! status codes, the way the teacher's `TaskApiError` does for its own
//! (smaller) surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Task(#[from] database::TaskStoreError),
    #[error(transparent)]
    Pipeline(#[from] database::PipelineStoreError),
    #[error(transparent)]
    Result(#[from] database::ResultStoreError),
    #[error(transparent)]
    SubjectApplication(#[from] database::SubjectApplicationStoreError),
    #[error(transparent)]
    Orchestrator(#[from] orchestrator::OrchestratorError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Orchestrator(orchestrator::OrchestratorError::PipelineNotFound(_)) => StatusCode::NOT_FOUND,
            ServerError::Orchestrator(orchestrator::OrchestratorError::DuplicateStepName)
            | ServerError::Orchestrator(orchestrator::OrchestratorError::UnknownDependency(_, _)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
