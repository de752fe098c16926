use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::{AppError, AppResult};
use crate::models::job::ThumbnailJob;
use crate::models::thumbnail::{CreateJobResponse, CreateThumbnailRequest, JobStatusResponse};
use crate::routes::auth::AuthUser;
use crate::services::images;

/// POST /api/thumbnail — Create a thumbnail generation job.
///
/// The queue slot is claimed before the job is written, so a full queue
/// rejects the request without leaving a pending job behind.
pub async fn create_thumbnail_job(
    State(state): State<AppState>,
    user: AuthUser,
    Json(mut request): Json<CreateThumbnailRequest>,
) -> AppResult<(StatusCode, Json<CreateJobResponse>)> {
    request.prompt = request.prompt.trim().to_string();
    request
        .validate()
        .map_err(|report| AppError::Validation(report.to_string()))?;

    let input_image = match request.image.as_deref().map(str::trim) {
        Some(encoded) if !encoded.is_empty() => {
            let image = images::decode_reference_image(encoded)
                .map_err(|e| AppError::Validation(format!("image: {e}")))?;
            Some(image.base64)
        }
        _ => None,
    };

    let slot = state.queue.reserve().inspect_err(|e| {
        metrics::counter!("thumbnail_jobs_rejected_total").increment(1);
        tracing::warn!(user_id = %user.user_id, error = %e, "Rejecting thumbnail job");
    })?;

    let job = ThumbnailJob::new(user.user_id, request.prompt, input_image);
    state.store.create(&job).await?;
    slot.send(job.id);

    metrics::counter!("thumbnail_jobs_submitted_total").increment(1);
    tracing::info!(
        job_id = %job.id,
        user_id = %job.owner,
        has_reference_image = job.input_image.is_some(),
        "Created thumbnail job"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateJobResponse {
            job_id: job.id,
            status: job.status,
        }),
    ))
}

/// GET /api/thumbnail/{job_id}/status — Current state of one of the caller's jobs.
pub async fn get_job_status(
    State(state): State<AppState>,
    user: AuthUser,
    job_id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<JobStatusResponse>> {
    let Path(job_id) = job_id.map_err(|e| {
        tracing::debug!(error = %e, "Rejecting malformed job id");
        AppError::Validation("job id must be a UUID".to_string())
    })?;

    let job = state
        .store
        .find_owned(job_id, &user.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(JobStatusResponse::from(&job)))
}
