use garde::Validate;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

use crate::client::api::{ApiError, ThumbnailApi};
use crate::client::session::{ClientSession, SessionError};
use crate::models::job::JobStatus;
use crate::models::thumbnail::CreateThumbnailRequest;

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    /// Status requests per job, the first one sent immediately.
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 60,
        }
    }
}

/// Client-side view of the tracked job. Mirrors the server status but is a
/// separate machine, advanced only by polling.
#[derive(Debug, Clone, PartialEq)]
pub enum PollerState {
    Idle,
    Submitting,
    Polling { job_id: Uuid, attempt: u32 },
    Resolved(Resolution),
    TimedOut { job_id: Uuid },
}

impl PollerState {
    fn is_busy(&self) -> bool {
        matches!(self, PollerState::Submitting | PollerState::Polling { .. })
    }
}

/// Terminal server state as seen by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Completed { job_id: Uuid, results: Vec<String> },
    Failed { job_id: Uuid, message: String },
}

/// Tracks at most one job at a time.
///
/// The active job id is written to the session before anything else happens
/// after creation, so a restart at any point can pick the job back up with
/// [`ClientPoller::resume`].
pub struct ClientPoller {
    api: Arc<dyn ThumbnailApi>,
    session: ClientSession,
    config: PollConfig,
    state: watch::Sender<PollerState>,
}

impl ClientPoller {
    pub fn new(api: Arc<dyn ThumbnailApi>, session: ClientSession, config: PollConfig) -> Self {
        let (state, _) = watch::channel(PollerState::Idle);
        Self {
            api,
            session,
            config,
            state,
        }
    }

    /// Watch state changes. The receiver always holds the latest state, so a
    /// late subscriber still sees how the last job resolved.
    pub fn subscribe(&self) -> watch::Receiver<PollerState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> PollerState {
        self.state.borrow().clone()
    }

    pub fn session(&self) -> &ClientSession {
        &self.session
    }

    /// Create a job for `prompt` and poll it to a terminal state.
    pub async fn submit(
        &self,
        prompt: &str,
        image: Option<String>,
    ) -> Result<Resolution, PollError> {
        let request = CreateThumbnailRequest {
            prompt: prompt.trim().to_string(),
            image: image.filter(|i| !i.trim().is_empty()),
        };
        request
            .validate()
            .map_err(|report| PollError::Validation(report.to_string()))?;

        if let Some(job_id) = self.session.active_job()? {
            return Err(PollError::JobOutstanding { job_id });
        }

        self.begin(PollerState::Submitting)?;

        let job_id = match self.create(&request).await {
            Ok(job_id) => job_id,
            Err(e) => {
                self.state.send_replace(PollerState::Idle);
                return Err(e);
            }
        };

        self.track(job_id).await
    }

    /// Pick up the job left by a previous run, if any, starting with an
    /// immediate status check.
    pub async fn resume(&self) -> Result<Option<Resolution>, PollError> {
        let Some(job_id) = self.session.active_job()? else {
            return Ok(None);
        };

        self.begin(PollerState::Polling { job_id, attempt: 0 })?;
        tracing::info!(job_id = %job_id, "Resuming active job");
        self.track(job_id).await.map(Some)
    }

    async fn create(&self, request: &CreateThumbnailRequest) -> Result<Uuid, PollError> {
        self.session.set_prompt(&request.prompt)?;
        self.session.set_input_image(request.image.as_deref())?;

        let created = self.api.create_job(request).await.map_err(PollError::Submit)?;
        self.session.set_active_job(created.job_id)?;

        tracing::info!(job_id = %created.job_id, status = %created.status, "Job submitted");
        Ok(created.job_id)
    }

    async fn track(&self, job_id: Uuid) -> Result<Resolution, PollError> {
        let result = self.poll_until_resolved(job_id).await;
        if result.is_err() && self.state.borrow().is_busy() {
            self.state.send_replace(PollerState::Idle);
        }
        result
    }

    async fn poll_until_resolved(&self, job_id: Uuid) -> Result<Resolution, PollError> {
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.config.interval).await;
            }
            self.state.send_replace(PollerState::Polling { job_id, attempt });

            let status = match self.api.job_status(job_id).await {
                Ok(status) => status,
                Err(e) if e.is_transient() => {
                    tracing::warn!(job_id = %job_id, attempt, error = %e, "Status check failed, will retry");
                    continue;
                }
                Err(e) if e.is_not_found() => {
                    tracing::warn!(job_id = %job_id, "Job no longer exists, forgetting it");
                    self.session.clear_active_job()?;
                    self.state.send_replace(PollerState::Idle);
                    return Err(PollError::JobLost { job_id });
                }
                Err(e) => {
                    // Keep the marker: a later run with valid credentials can resume.
                    self.state.send_replace(PollerState::Idle);
                    return Err(PollError::Status(e));
                }
            };

            let resolution = match status.status {
                JobStatus::Pending | JobStatus::Processing => {
                    tracing::debug!(job_id = %job_id, attempt, status = %status.status, "Job still running");
                    continue;
                }
                JobStatus::Completed => {
                    let results = status.results.unwrap_or_default();
                    self.session.merge_results(&results)?;
                    Resolution::Completed { job_id, results }
                }
                JobStatus::Failed => Resolution::Failed {
                    job_id,
                    message: status
                        .error_message
                        .unwrap_or_else(|| "Generation failed".to_string()),
                },
            };

            self.session.clear_active_job()?;
            tracing::info!(job_id = %job_id, attempt, "Job resolved");
            self.state.send_replace(PollerState::Resolved(resolution.clone()));
            return Ok(resolution);
        }

        tracing::warn!(job_id = %job_id, attempts = max_attempts, "Polling timed out");
        self.session.clear_active_job()?;
        self.state.send_replace(PollerState::TimedOut { job_id });
        Err(PollError::TimedOut {
            job_id,
            attempts: max_attempts,
        })
    }

    /// Move into a busy state unless a job is already being handled.
    fn begin(&self, next: PollerState) -> Result<(), PollError> {
        let mut busy = false;
        self.state.send_if_modified(|current| {
            if current.is_busy() {
                busy = true;
                return false;
            }
            *current = next;
            true
        });

        if busy {
            return Err(PollError::Busy);
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("Invalid prompt: {0}")]
    Validation(String),

    #[error("A job is already being submitted or polled")]
    Busy,

    #[error("Job {job_id} is still outstanding; resume it first")]
    JobOutstanding { job_id: Uuid },

    #[error("Could not submit job: {0}")]
    Submit(ApiError),

    #[error("Status check failed: {0}")]
    Status(ApiError),

    #[error("Job {job_id} no longer exists on the server")]
    JobLost { job_id: Uuid },

    #[error("Polling timed out for job {job_id} after {attempts} attempts")]
    TimedOut { job_id: Uuid, attempts: u32 },

    #[error(transparent)]
    Session(#[from] SessionError),
}
