//! Startup reconciliation of jobs orphaned by a previous process.
//!
//! The work queue lives in memory, so ids queued or in flight when the
//! server stopped are gone. This sweep finds their jobs in the store and
//! either queues them again or fails them.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use strum::{Display, EnumString};

use crate::db::{JobStore, StoreError};
use crate::models::job::{JobStatus, ThumbnailJob};
use crate::services::queue::JobQueue;

pub const INTERRUPTED_MESSAGE: &str = "Job was interrupted by a server restart";

/// What to do with a `Pending` job found by the sweep. `Processing` jobs are
/// always failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RecoveryPolicy {
    Requeue,
    Fail,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecoveryReport {
    pub requeued: usize,
    pub failed: usize,
}

/// Reconcile non-terminal jobs older than `stale_after`.
pub async fn reconcile_orphaned_jobs(
    store: &dyn JobStore,
    queue: &JobQueue,
    policy: RecoveryPolicy,
    stale_after: Duration,
) -> Result<RecoveryReport, StoreError> {
    let cutoff = cutoff(Utc::now(), stale_after);
    let orphans = store.list_unfinished(cutoff).await?;
    let mut report = RecoveryReport::default();

    if orphans.is_empty() {
        tracing::debug!("No orphaned jobs found");
        return Ok(report);
    }

    tracing::info!(count = orphans.len(), policy = %policy, "Reconciling orphaned jobs");

    for job in orphans {
        let requeue = job.status == JobStatus::Pending && policy == RecoveryPolicy::Requeue;
        if requeue {
            match queue.enqueue(job.id) {
                Ok(()) => {
                    tracing::info!(job_id = %job.id, "Re-enqueued orphaned job");
                    report.requeued += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(job_id = %job.id, error = %e, "Could not re-enqueue orphaned job");
                }
            }
        }

        fail_orphan(store, job).await?;
        report.failed += 1;
    }

    tracing::info!(
        requeued = report.requeued,
        failed = report.failed,
        "Orphaned job reconciliation finished"
    );
    Ok(report)
}

async fn fail_orphan(store: &dyn JobStore, mut job: ThumbnailJob) -> Result<(), StoreError> {
    let job_id = job.id;
    if let Err(e) = job.fail(INTERRUPTED_MESSAGE, Utc::now()) {
        tracing::warn!(job_id = %job_id, error = %e, "Skipping orphaned job");
        return Ok(());
    }
    match store.update(&job).await {
        Ok(()) => {
            tracing::warn!(job_id = %job_id, "Marked orphaned job as failed");
            Ok(())
        }
        // Finished concurrently; nothing left to reconcile.
        Err(StoreError::Stale { .. }) => Ok(()),
        Err(e) => Err(e),
    }
}

fn cutoff(now: DateTime<Utc>, stale_after: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(stale_after)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(now)
}
