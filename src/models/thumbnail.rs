use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{JobStatus, ThumbnailJob};

/// Request body for `POST /api/thumbnail`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateThumbnailRequest {
    #[garde(length(chars, min = 3, max = 1000), custom(not_blank))]
    pub prompt: String,

    /// Optional reference image, bare base64 or a `data:` URL.
    #[garde(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

fn not_blank(value: &str, _ctx: &()) -> garde::Result {
    if value.trim().is_empty() {
        return Err(garde::Error::new("prompt must not be blank"));
    }
    Ok(())
}

/// Response after a job has been accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
}

/// Response for `GET /api/thumbnail/{job_id}/status`.
///
/// `results` is present only for `Completed` jobs and `error_message` only
/// for `Failed` ones.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<&ThumbnailJob> for JobStatusResponse {
    fn from(job: &ThumbnailJob) -> Self {
        Self {
            status: job.status,
            results: (job.status == JobStatus::Completed).then(|| job.results.clone()),
            error_message: match job.status {
                JobStatus::Failed => job.error_message.clone(),
                _ => None,
            },
        }
    }
}
