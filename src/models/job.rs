use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Status of a thumbnail generation job.
///
/// Transitions only move forward: `Pending -> Processing -> Completed | Failed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// `Completed` and `Failed` accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// A thumbnail generation job as persisted in the job store.
///
/// Fields are public for reads and row mapping; state changes go through
/// [`ThumbnailJob::start_processing`], [`ThumbnailJob::complete`] and
/// [`ThumbnailJob::fail`] so that `results` and `error_message` stay
/// consistent with `status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThumbnailJob {
    pub id: Uuid,
    pub owner: String,
    pub prompt: String,
    pub input_image: Option<String>,
    pub status: JobStatus,
    pub results: Vec<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ThumbnailJob {
    /// Create a new `Pending` job with a fresh id.
    pub fn new(owner: impl Into<String>, prompt: impl Into<String>, input_image: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: owner.into(),
            prompt: prompt.into(),
            input_image,
            status: JobStatus::Pending,
            results: Vec::new(),
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn start_processing(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Processing)?;
        Ok(())
    }

    /// Mark the job `Completed` with at least one result image.
    pub fn complete(&mut self, results: Vec<String>, at: DateTime<Utc>) -> Result<(), TransitionError> {
        if results.is_empty() {
            return Err(TransitionError::EmptyResults { job_id: self.id });
        }
        self.transition(JobStatus::Completed)?;
        self.results = results;
        self.error_message = None;
        self.completed_at = Some(at);
        Ok(())
    }

    /// Mark the job `Failed`. Allowed from `Pending` as well, for jobs the
    /// recovery sweep gives up on before they ever ran.
    pub fn fail(&mut self, message: impl Into<String>, at: DateTime<Utc>) -> Result<(), TransitionError> {
        let mut message = message.into();
        if message.trim().is_empty() {
            message = "Generation failed".to_string();
        }
        self.transition(JobStatus::Failed)?;
        self.results.clear();
        self.error_message = Some(message);
        self.completed_at = Some(at);
        Ok(())
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), TransitionError> {
        let allowed = match (self.status, next) {
            (JobStatus::Pending, JobStatus::Processing) => true,
            (JobStatus::Processing, JobStatus::Completed) => true,
            (JobStatus::Pending | JobStatus::Processing, JobStatus::Failed) => true,
            _ => false,
        };

        if !allowed {
            return Err(TransitionError::Invalid {
                job_id: self.id,
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TransitionError {
    #[error("Job {job_id} cannot move from {from} to {to}")]
    Invalid {
        job_id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Job {job_id} cannot complete without result images")]
    EmptyResults { job_id: Uuid },
}
