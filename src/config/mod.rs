use serde::Deserialize;
use std::time::Duration;

use crate::services::queue::DEFAULT_QUEUE_CAPACITY;
use crate::services::recovery::RecoveryPolicy;
use crate::services::worker::WorkerConfig;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000")
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string. Without it jobs are kept in memory.
    #[serde(default)]
    pub database_url: Option<String>,

    /// HS256 secret for validating caller tokens
    pub jwt_secret: String,

    /// Gemini API key
    pub gemini_api_key: String,

    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    #[serde(default = "default_gemini_base_url")]
    pub gemini_base_url: String,

    /// Maximum number of job ids waiting in the work queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Cap on stored images per job
    #[serde(default = "default_max_results")]
    pub max_results_per_job: usize,

    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,

    /// Worker pause after a loop-level failure
    #[serde(default = "default_worker_error_backoff_ms")]
    pub worker_error_backoff_ms: u64,

    /// What the startup sweep does with orphaned pending jobs
    #[serde(default = "default_recovery_policy")]
    pub recovery_policy: RecoveryPolicy,

    /// Minimum age of a non-terminal job before the sweep touches it
    #[serde(default)]
    pub recovery_stale_after_secs: u64,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash-image".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_max_results() -> usize {
    2
}

fn default_generation_timeout_secs() -> u64 {
    120
}

fn default_worker_error_backoff_ms() -> u64 {
    5000
}

fn default_recovery_policy() -> RecoveryPolicy {
    RecoveryPolicy::Requeue
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            max_results: self.max_results_per_job.max(1),
            generation_timeout: Duration::from_secs(self.generation_timeout_secs),
            error_backoff: Duration::from_millis(self.worker_error_backoff_ms),
        }
    }

    pub fn recovery_stale_after(&self) -> Duration {
        Duration::from_secs(self.recovery_stale_after_secs)
    }
}
