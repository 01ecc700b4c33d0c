#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    MissingRequired(&'static str),
    #[error("environment variable {0} could not be parsed")]
    InvalidValue(&'static str),
    #[error("invalid APP_ENVIRONMENT value: {0}")]
    InvalidEnvironment(String),
    #[error(transparent)]
    Validation(#[from] validator::ValidationErrors),
}
