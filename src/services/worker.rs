use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db::{JobStore, StoreError};
use crate::models::job::{JobStatus, ThumbnailJob, TransitionError};
use crate::services::generation::GenerationProvider;
use crate::services::prompt::build_thumbnail_prompt;
use crate::services::queue::JobReceiver;

pub const CRASHED_MESSAGE: &str = "Generation crashed unexpectedly";
pub const SAVE_FAILED_MESSAGE: &str = "Failed to save generation results";

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Upper bound on stored images per job.
    pub max_results: usize,
    /// A provider call running longer than this fails the job.
    pub generation_timeout: Duration,
    /// Pause after a failure outside per-job handling before dequeuing again.
    pub error_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_results: 2,
            generation_timeout: Duration::from_secs(120),
            error_backoff: Duration::from_secs(5),
        }
    }
}

/// What happened to a dequeued job id.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed { results: usize },
    Failed { message: String },
    /// No job with this id exists; the id is dropped.
    Missing,
    /// The job had already left `Pending` (e.g. enqueued twice).
    Skipped { status: JobStatus },
}

/// The single background consumer of the work queue.
///
/// Jobs run strictly one at a time in dequeue order. Provider failures turn
/// the job `Failed`; any other failure is logged and the loop carries on
/// after a short backoff.
#[derive(Clone)]
pub struct JobWorker {
    store: Arc<dyn JobStore>,
    provider: Arc<dyn GenerationProvider>,
    config: WorkerConfig,
}

impl JobWorker {
    pub fn new(
        store: Arc<dyn JobStore>,
        provider: Arc<dyn GenerationProvider>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    /// Consume the queue until `cancel` fires.
    ///
    /// Cancellation is only observed while waiting for work or backing off;
    /// a job already handed to the provider runs to completion.
    pub async fn run(self, mut receiver: JobReceiver, cancel: CancellationToken) {
        tracing::info!(
            max_results = self.config.max_results,
            timeout_secs = self.config.generation_timeout.as_secs(),
            "Thumbnail worker started"
        );

        while let Some(job_id) = receiver.dequeue(&cancel).await {
            tracing::debug!(job_id = %job_id, "Dequeued job");

            let worker = self.clone();
            let result = match tokio::spawn(async move { worker.process(job_id).await }).await {
                Ok(result) => result,
                Err(join_error) => {
                    tracing::error!(job_id = %job_id, error = %join_error, "Job processing panicked");
                    self.fail_abandoned(job_id, CRASHED_MESSAGE).await;
                    Err(WorkerError::Panicked { job_id })
                }
            };

            if let Err(e) = result {
                tracing::error!(job_id = %job_id, error = %e, "Error in worker loop, backing off");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.config.error_backoff) => {}
                }
            }
        }

        tracing::info!("Thumbnail worker stopping");
    }

    /// Drive one job from `Pending` to a terminal state.
    pub async fn process(&self, job_id: Uuid) -> Result<JobOutcome, WorkerError> {
        let Some(mut job) = self.store.find(job_id).await? else {
            tracing::warn!(job_id = %job_id, "Job not found, dropping");
            return Ok(JobOutcome::Missing);
        };

        if job.status != JobStatus::Pending {
            tracing::warn!(job_id = %job_id, status = %job.status, "Job is not pending, skipping");
            return Ok(JobOutcome::Skipped { status: job.status });
        }

        tracing::info!(
            job_id = %job_id,
            owner = %job.owner,
            has_reference_image = job.input_image.is_some(),
            "Processing thumbnail job"
        );

        job.start_processing()?;
        self.store.update(&job).await?;

        let start = Instant::now();
        let outcome = match self.generate(&job).await {
            Ok(images) => {
                let count = images.len();
                job.complete(images, Utc::now())?;
                JobOutcome::Completed { results: count }
            }
            Err(message) => {
                job.fail(message, Utc::now())?;
                JobOutcome::Failed {
                    message: job.error_message.clone().unwrap_or_default(),
                }
            }
        };
        let elapsed = start.elapsed();

        if let Err(e) = self.store.update(&job).await {
            tracing::error!(job_id = %job_id, error = %e, "Failed to save job outcome");
            self.fail_abandoned(job_id, SAVE_FAILED_MESSAGE).await;
            return Err(e.into());
        }
        metrics::histogram!("thumbnail_generation_seconds").record(elapsed.as_secs_f64());

        match &outcome {
            JobOutcome::Completed { results } => {
                metrics::counter!("thumbnail_jobs_completed_total").increment(1);
                tracing::info!(
                    job_id = %job_id,
                    results = *results,
                    duration_ms = elapsed.as_millis() as u64,
                    "Job completed"
                );
            }
            JobOutcome::Failed { message } => {
                metrics::counter!("thumbnail_jobs_failed_total").increment(1);
                tracing::warn!(
                    job_id = %job_id,
                    error = %message,
                    duration_ms = elapsed.as_millis() as u64,
                    "Job failed"
                );
            }
            _ => {}
        }

        Ok(outcome)
    }

    /// Call the provider. Every failure becomes a message for the job.
    async fn generate(&self, job: &ThumbnailJob) -> Result<Vec<String>, String> {
        let prompt = build_thumbnail_prompt(&job.prompt, job.input_image.is_some());
        let max_results = self.config.max_results.max(1);

        let call = self
            .provider
            .generate(&prompt, job.input_image.as_deref(), max_results);

        let mut images = match tokio::time::timeout(self.config.generation_timeout, call).await {
            Ok(Ok(images)) => images,
            Ok(Err(e)) => return Err(e.to_string()),
            Err(_) => {
                return Err(format!(
                    "Generation timed out after {}s",
                    self.config.generation_timeout.as_secs()
                ))
            }
        };

        images.retain(|image| !image.is_empty());
        if images.is_empty() {
            return Err("Generation returned no images".to_string());
        }
        images.truncate(max_results);
        Ok(images)
    }

    /// Best effort: a job whose processing task died, or whose outcome could
    /// not be saved, must not stay `Processing` while this process is alive.
    async fn fail_abandoned(&self, job_id: Uuid, message: &str) {
        let job = match self.store.find(job_id).await {
            Ok(Some(job)) if !job.status.is_terminal() => job,
            Ok(_) => return,
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to load abandoned job");
                return;
            }
        };

        let mut job = job;
        if job.fail(message, Utc::now()).is_ok() {
            if let Err(e) = self.store.update(&job).await {
                tracing::error!(job_id = %job_id, error = %e, "Failed to mark abandoned job as failed");
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Job store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid job transition: {0}")]
    Transition(#[from] TransitionError),

    #[error("Processing task for job {job_id} panicked")]
    Panicked { job_id: Uuid },
}
