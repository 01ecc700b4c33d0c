//! Connection pool construction and migration bootstrap.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self { url: url.into(), max_connections: 10 }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("failed to connect: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[source] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Query(#[from] sqlx::Error),
}

/// Thin wrapper around a `PgPool`; every store (`task_store`,
/// `pipeline_store`, `subject_application_store`, `result_store`) holds one
/// of these rather than opening its own connections.
#[derive(Clone)]
pub struct DatabaseClient {
    pool: PgPool,
}

impl DatabaseClient {
    pub async fn connect(config: DatabaseConfig) -> Result<Self, DatabaseError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(DatabaseError::Connect)?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(DatabaseError::Migrate)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
