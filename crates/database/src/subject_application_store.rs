//! Subject application registry: tracks which generated web applications
//! exist, and the missing/grace-period bookkeeping that drives the
//! maintenance sweep's eventual soft delete.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use contracts::subject_application::{AppIdentity, SubjectApplication, DEFAULT_MISSING_GRACE_PERIOD_DAYS};

use crate::models::SubjectApplicationRow;
use crate::queries::subject_application_queries;

#[derive(Debug, thiserror::Error)]
pub enum SubjectApplicationStoreError {
    #[error(transparent)]
    Query(#[from] sqlx::Error),
}

fn row_to_domain(row: SubjectApplicationRow) -> SubjectApplication {
    SubjectApplication {
        identity: AppIdentity::new(row.model_identifier, row.app_number as u32),
        backend_port: row.backend_port as u16,
        frontend_port: row.frontend_port as u16,
        created_at: row.created_at,
        missing_since: row.missing_since,
        deleted_at: row.deleted_at,
    }
}

#[derive(Clone)]
pub struct SubjectApplicationStore {
    pool: PgPool,
    grace_period_days: i64,
}

impl SubjectApplicationStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            grace_period_days: DEFAULT_MISSING_GRACE_PERIOD_DAYS,
        }
    }

    pub fn with_grace_period_days(mut self, days: i64) -> Self {
        self.grace_period_days = days;
        self
    }

    /// `ON CONFLICT DO NOTHING`: registering an application that already
    /// exists is a no-op, not an error — the maintenance sweep and the
    /// orchestrator may both observe the same application independently.
    pub async fn upsert(
        &self,
        identity: &AppIdentity,
        backend_port: u16,
        frontend_port: u16,
    ) -> Result<Option<SubjectApplication>, SubjectApplicationStoreError> {
        let row: Option<SubjectApplicationRow> = sqlx::query_as(subject_application_queries::UPSERT)
            .bind(&identity.model_identifier)
            .bind(identity.app_number as i32)
            .bind(backend_port as i32)
            .bind(frontend_port as i32)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(row_to_domain))
    }

    pub async fn get(&self, identity: &AppIdentity) -> Result<Option<SubjectApplication>, SubjectApplicationStoreError> {
        let row: Option<SubjectApplicationRow> = sqlx::query_as(subject_application_queries::GET)
            .bind(&identity.model_identifier)
            .bind(identity.app_number as i32)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(row_to_domain))
    }

    /// Idempotent: marking an already-missing application does not reset
    /// the clock, since `missing_since` is only set `WHERE missing_since
    /// IS NULL`.
    pub async fn mark_missing(&self, identity: &AppIdentity) -> Result<Option<SubjectApplication>, SubjectApplicationStoreError> {
        let row: Option<SubjectApplicationRow> = sqlx::query_as(subject_application_queries::MARK_MISSING)
            .bind(&identity.model_identifier)
            .bind(identity.app_number as i32)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(row_to_domain))
    }

    pub async fn clear_missing(&self, identity: &AppIdentity) -> Result<Option<SubjectApplication>, SubjectApplicationStoreError> {
        let row: Option<SubjectApplicationRow> = sqlx::query_as(subject_application_queries::CLEAR_MISSING)
            .bind(&identity.model_identifier)
            .bind(identity.app_number as i32)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(row_to_domain))
    }

    /// Every non-deleted application, for the maintenance sweep's orphan
    /// check to walk against the filesystem.
    pub async fn list_active(&self) -> Result<Vec<SubjectApplication>, SubjectApplicationStoreError> {
        let rows: Vec<SubjectApplicationRow> = sqlx::query_as(subject_application_queries::LIST_ACTIVE)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(row_to_domain).collect())
    }

    pub async fn find_eligible_for_deletion(&self, now: DateTime<Utc>) -> Result<Vec<SubjectApplication>, SubjectApplicationStoreError> {
        let cutoff = now - chrono::Duration::days(self.grace_period_days);
        let rows: Vec<SubjectApplicationRow> = sqlx::query_as(subject_application_queries::FIND_ELIGIBLE_FOR_DELETION)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(row_to_domain).collect())
    }

    pub async fn soft_delete(&self, identity: &AppIdentity) -> Result<(), SubjectApplicationStoreError> {
        sqlx::query(subject_application_queries::SOFT_DELETE)
            .bind(&identity.model_identifier)
            .bind(identity.app_number as i32)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
