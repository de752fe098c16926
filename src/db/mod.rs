use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use uuid::Uuid;

use crate::models::job::ThumbnailJob;

pub mod memory;
pub mod queries;

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

/// Durable record of every generation job.
///
/// Each call is atomic per job. `update` only succeeds while the stored job
/// is still non-terminal, so a finished job can never be rewritten.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: &ThumbnailJob) -> Result<(), StoreError>;

    async fn find(&self, id: Uuid) -> Result<Option<ThumbnailJob>, StoreError>;

    /// Like `find`, but only returns the job if `owner` created it.
    async fn find_owned(&self, id: Uuid, owner: &str) -> Result<Option<ThumbnailJob>, StoreError>;

    async fn update(&self, job: &ThumbnailJob) -> Result<(), StoreError>;

    /// Pending or Processing jobs created before `created_before`, oldest first.
    async fn list_unfinished(
        &self,
        created_before: DateTime<Utc>,
    ) -> Result<Vec<ThumbnailJob>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Job {job_id} is missing or already finished")]
    Stale { job_id: Uuid },

    #[error("Job {job_id} already exists")]
    Duplicate { job_id: Uuid },
}

/// PostgreSQL-backed job store.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, job: &ThumbnailJob) -> Result<(), StoreError> {
        queries::create_job(&self.pool, job).await?;
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<ThumbnailJob>, StoreError> {
        Ok(queries::get_job(&self.pool, id).await?)
    }

    async fn find_owned(&self, id: Uuid, owner: &str) -> Result<Option<ThumbnailJob>, StoreError> {
        Ok(queries::get_job_for_owner(&self.pool, id, owner).await?)
    }

    async fn update(&self, job: &ThumbnailJob) -> Result<(), StoreError> {
        let updated = queries::update_job(&self.pool, job).await?;
        if updated == 0 {
            return Err(StoreError::Stale { job_id: job.id });
        }
        Ok(())
    }

    async fn list_unfinished(
        &self,
        created_before: DateTime<Utc>,
    ) -> Result<Vec<ThumbnailJob>, StoreError> {
        Ok(queries::get_unfinished_jobs(&self.pool, created_before).await?)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
