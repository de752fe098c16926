use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{JobStore, StoreError};
use crate::models::job::ThumbnailJob;

/// In-memory job store.
///
/// Used when no `DATABASE_URL` is configured and by the test suite. Jobs do
/// not survive a restart.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<Uuid, ThumbnailJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &ThumbnailJob) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::Duplicate { job_id: job.id });
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<ThumbnailJob>, StoreError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn find_owned(&self, id: Uuid, owner: &str) -> Result<Option<ThumbnailJob>, StoreError> {
        Ok(self
            .jobs
            .read()
            .await
            .get(&id)
            .filter(|job| job.owner == owner)
            .cloned())
    }

    async fn update(&self, job: &ThumbnailJob) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job.id) {
            Some(stored) if !stored.status.is_terminal() => {
                stored.status = job.status;
                stored.results = job.results.clone();
                stored.error_message = job.error_message.clone();
                stored.completed_at = job.completed_at;
                Ok(())
            }
            _ => Err(StoreError::Stale { job_id: job.id }),
        }
    }

    async fn list_unfinished(
        &self,
        created_before: DateTime<Utc>,
    ) -> Result<Vec<ThumbnailJob>, StoreError> {
        let mut jobs: Vec<ThumbnailJob> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| !job.status.is_terminal() && job.created_at < created_before)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
