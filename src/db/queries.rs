use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::job::{JobStatus, ThumbnailJob};

const JOB_COLUMNS: &str = "id, owner, prompt, input_image, status, results, error_message, \
                           created_at, completed_at";

/// Insert a new thumbnail job
pub async fn create_job(pool: &PgPool, job: &ThumbnailJob) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO thumbnail_jobs
            (id, owner, prompt, input_image, status, results, error_message, created_at, completed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(job.id)
    .bind(&job.owner)
    .bind(&job.prompt)
    .bind(job.input_image.as_deref())
    .bind(job.status.to_string())
    .bind(Json(&job.results))
    .bind(job.error_message.as_deref())
    .bind(job.created_at)
    .bind(job.completed_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get a job by ID
pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<ThumbnailJob>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {JOB_COLUMNS} FROM thumbnail_jobs WHERE id = $1"
    ))
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| job_from_row(&r)).transpose()
}

/// Get a job by ID, scoped to its owner
pub async fn get_job_for_owner(
    pool: &PgPool,
    job_id: Uuid,
    owner: &str,
) -> Result<Option<ThumbnailJob>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {JOB_COLUMNS} FROM thumbnail_jobs WHERE id = $1 AND owner = $2"
    ))
    .bind(job_id)
    .bind(owner)
    .fetch_optional(pool)
    .await?;

    row.map(|r| job_from_row(&r)).transpose()
}

/// Persist a job's lifecycle fields. Returns the number of rows written,
/// which is zero when the job is missing or already terminal.
pub async fn update_job(pool: &PgPool, job: &ThumbnailJob) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE thumbnail_jobs
        SET status = $1,
            results = $2,
            error_message = $3,
            completed_at = $4
        WHERE id = $5
          AND status NOT IN ('Completed', 'Failed')
        "#,
    )
    .bind(job.status.to_string())
    .bind(Json(&job.results))
    .bind(job.error_message.as_deref())
    .bind(job.completed_at)
    .bind(job.id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Get non-terminal jobs created before the cutoff (for the recovery sweep)
pub async fn get_unfinished_jobs(
    pool: &PgPool,
    created_before: DateTime<Utc>,
) -> Result<Vec<ThumbnailJob>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {JOB_COLUMNS} FROM thumbnail_jobs \
         WHERE status IN ('Pending', 'Processing') AND created_at < $1 \
         ORDER BY created_at ASC"
    ))
    .bind(created_before)
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}

fn job_from_row(r: &PgRow) -> Result<ThumbnailJob, sqlx::Error> {
    let status_str: String = r.try_get("status")?;
    let status = JobStatus::from_str(&status_str).map_err(|e| sqlx::Error::ColumnDecode {
        index: "status".to_string(),
        source: Box::new(e),
    })?;
    let results: Json<Vec<String>> = r.try_get("results")?;

    Ok(ThumbnailJob {
        id: r.try_get("id")?,
        owner: r.try_get("owner")?,
        prompt: r.try_get("prompt")?,
        input_image: r.try_get("input_image")?,
        status,
        results: results.0,
        error_message: r.try_get("error_message")?,
        created_at: r.try_get("created_at")?,
        completed_at: r.try_get("completed_at")?,
    })
}
