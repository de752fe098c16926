mod helpers;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use helpers::*;
use thumbnail_gen::{
    db::{memory::MemoryJobStore, JobStore},
    models::job::{JobStatus, ThumbnailJob},
    services::{
        queue::job_queue,
        worker::{JobOutcome, JobWorker, WorkerConfig, WorkerError, SAVE_FAILED_MESSAGE},
    },
};

async fn pending_job(store: &dyn JobStore, prompt: &str) -> ThumbnailJob {
    let job = ThumbnailJob::new("alice", prompt, None);
    store.create(&job).await.unwrap();
    job
}

#[tokio::test]
async fn test_process_completes_job() {
    let store = Arc::new(MemoryJobStore::new());
    let worker = JobWorker::new(store.clone(), Arc::new(FixedProvider::new(2)), fast_worker_config());
    let job = pending_job(store.as_ref(), "neon gaming thumbnail").await;

    let outcome = worker.process(job.id).await.unwrap();
    assert_eq!(outcome, JobOutcome::Completed { results: 2 });

    let stored = store.find(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.results.len(), 2);
    assert!(stored.error_message.is_none());
    assert!(stored.completed_at.is_some());
}

#[tokio::test]
async fn test_provider_error_fails_job_with_its_message() {
    let store = Arc::new(MemoryJobStore::new());
    let provider = Arc::new(FailingProvider {
        message: "rate limited".to_string(),
    });
    let worker = JobWorker::new(store.clone(), provider, fast_worker_config());
    let job = pending_job(store.as_ref(), "neon gaming thumbnail").await;

    let outcome = worker.process(job.id).await.unwrap();
    assert_eq!(
        outcome,
        JobOutcome::Failed {
            message: "rate limited".to_string()
        }
    );

    let stored = store.find(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.error_message.as_deref(), Some("rate limited"));
    assert!(stored.results.is_empty());
}

#[tokio::test]
async fn test_missing_job_is_dropped() {
    let store = Arc::new(MemoryJobStore::new());
    let worker = JobWorker::new(store.clone(), Arc::new(FixedProvider::new(1)), fast_worker_config());

    let outcome = worker.process(Uuid::new_v4()).await.unwrap();
    assert_eq!(outcome, JobOutcome::Missing);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_results_are_capped() {
    let store = Arc::new(MemoryJobStore::new());
    let worker = JobWorker::new(store.clone(), Arc::new(FixedProvider::new(5)), fast_worker_config());
    let job = pending_job(store.as_ref(), "neon gaming thumbnail").await;

    assert_eq!(
        worker.process(job.id).await.unwrap(),
        JobOutcome::Completed { results: 2 }
    );
    let stored = store.find(job.id).await.unwrap().unwrap();
    assert_eq!(stored.results, vec![data_url(0), data_url(1)]);
}

#[tokio::test]
async fn test_zero_images_fails_job() {
    let store = Arc::new(MemoryJobStore::new());
    let worker = JobWorker::new(store.clone(), Arc::new(FixedProvider::new(0)), fast_worker_config());
    let job = pending_job(store.as_ref(), "neon gaming thumbnail").await;

    worker.process(job.id).await.unwrap();

    let stored = store.find(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(
        stored.error_message.as_deref(),
        Some("Generation returned no images")
    );
}

#[tokio::test(start_paused = true)]
async fn test_slow_provider_times_out() {
    let store = Arc::new(MemoryJobStore::new());
    let provider = Arc::new(SlowProvider {
        delay: Duration::from_secs(600),
    });
    let config = WorkerConfig {
        generation_timeout: Duration::from_secs(30),
        ..WorkerConfig::default()
    };
    let worker = JobWorker::new(store.clone(), provider, config);
    let job = pending_job(store.as_ref(), "neon gaming thumbnail").await;

    worker.process(job.id).await.unwrap();

    let stored = store.find(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(
        stored.error_message.as_deref(),
        Some("Generation timed out after 30s")
    );
}

#[tokio::test]
async fn test_non_pending_job_is_skipped() {
    let store = Arc::new(MemoryJobStore::new());
    let provider = Arc::new(FixedProvider::new(2));
    let worker = JobWorker::new(store.clone(), provider.clone(), fast_worker_config());
    let job = pending_job(store.as_ref(), "neon gaming thumbnail").await;

    worker.process(job.id).await.unwrap();
    let outcome = worker.process(job.id).await.unwrap();

    assert_eq!(
        outcome,
        JobOutcome::Skipped {
            status: JobStatus::Completed
        }
    );
    assert_eq!(provider.prompts().len(), 1);
}

#[tokio::test]
async fn test_run_processes_in_fifo_order() {
    let store = Arc::new(MemoryJobStore::new());
    let provider = Arc::new(FixedProvider::new(1));
    let (queue, receiver) = job_queue(10);

    let mut ids = Vec::new();
    for prompt in ["first prompt", "second prompt", "third prompt"] {
        let job = pending_job(store.as_ref(), prompt).await;
        queue.enqueue(job.id).unwrap();
        ids.push(job.id);
    }

    let worker = JobWorker::new(store.clone(), provider.clone(), fast_worker_config());
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(worker.run(receiver, cancel.clone()));

    wait_for_status(store.as_ref(), ids[2], JobStatus::Completed).await;
    cancel.cancel();
    handle.await.unwrap();

    let prompts = provider.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[0].ends_with("first prompt"));
    assert!(prompts[1].ends_with("second prompt"));
    assert!(prompts[2].ends_with("third prompt"));
}

#[tokio::test]
async fn test_run_survives_store_failure() {
    let store = Arc::new(FlakyStore::new(1));
    let (queue, receiver) = job_queue(10);

    let lost = pending_job(&store.inner, "lost to a store outage").await;
    let kept = pending_job(&store.inner, "processed after backoff").await;
    queue.enqueue(lost.id).unwrap();
    queue.enqueue(kept.id).unwrap();

    let worker = JobWorker::new(store.clone(), Arc::new(FixedProvider::new(1)), fast_worker_config());
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(worker.run(receiver, cancel.clone()));

    wait_for_status(&store.inner, kept.id, JobStatus::Completed).await;
    cancel.cancel();
    handle.await.unwrap();

    // The id that hit the outage was consumed; its job is left for recovery.
    let lost = store.inner.find(lost.id).await.unwrap().unwrap();
    assert_eq!(lost.status, JobStatus::Pending);
}

#[tokio::test]
async fn test_run_exits_on_cancel() {
    let store = Arc::new(MemoryJobStore::new());
    let (queue, receiver) = job_queue(10);
    let worker = JobWorker::new(store, Arc::new(FixedProvider::new(1)), fast_worker_config());
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(worker.run(receiver, cancel.clone()));

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("worker did not stop")
        .unwrap();
    drop(queue);
}

#[tokio::test]
async fn test_panicking_generation_fails_job() {
    let store = Arc::new(MemoryJobStore::new());
    let (queue, receiver) = job_queue(10);
    let job = pending_job(store.as_ref(), "neon gaming thumbnail").await;
    queue.enqueue(job.id).unwrap();

    let worker = JobWorker::new(store.clone(), Arc::new(PanickingProvider), fast_worker_config());
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(worker.run(receiver, cancel.clone()));

    let failed = wait_for_status(store.as_ref(), job.id, JobStatus::Failed).await;
    assert!(failed.error_message.is_some());

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_processing_is_visible_while_generating() {
    let store = Arc::new(MemoryJobStore::new());
    let provider = Arc::new(GatedProvider::default());
    let worker = JobWorker::new(store.clone(), provider.clone(), fast_worker_config());
    let job = pending_job(store.as_ref(), "neon gaming thumbnail").await;

    let job_id = job.id;
    let running = tokio::spawn(async move { worker.process(job_id).await });
    provider.started.notified().await;

    let during = store.find(job.id).await.unwrap().unwrap();
    assert_eq!(during.status, JobStatus::Processing);
    assert!(during.results.is_empty());
    assert!(during.error_message.is_none());
    assert!(during.completed_at.is_none());

    provider.release.notify_one();
    let outcome = running.await.unwrap().unwrap();
    assert_eq!(outcome, JobOutcome::Completed { results: 2 });

    let after = store.find(job.id).await.unwrap().unwrap();
    assert_eq!(after.status, JobStatus::Completed);
    assert!(after.completed_at.is_some());
}

#[tokio::test]
async fn test_unsaved_outcome_fails_job() {
    // First update marks Processing; the second one saves the outcome.
    let store = Arc::new(FailingUpdateStore::new(2));
    let worker = JobWorker::new(store.clone(), Arc::new(FixedProvider::new(2)), fast_worker_config());
    let job = pending_job(&store.inner, "neon gaming thumbnail").await;

    let result = worker.process(job.id).await;
    assert!(matches!(result, Err(WorkerError::Store(_))));

    let stored = store.inner.find(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.error_message.as_deref(), Some(SAVE_FAILED_MESSAGE));
    assert!(stored.results.is_empty());
    assert!(stored.completed_at.is_some());
}

#[tokio::test]
async fn test_run_fails_job_when_outcome_cannot_be_saved() {
    let store = Arc::new(FailingUpdateStore::new(2));
    let (queue, receiver) = job_queue(10);
    let job = pending_job(&store.inner, "neon gaming thumbnail").await;
    queue.enqueue(job.id).unwrap();

    let worker = JobWorker::new(store.clone(), Arc::new(FixedProvider::new(2)), fast_worker_config());
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(worker.run(receiver, cancel.clone()));

    let failed = wait_for_status(&store.inner, job.id, JobStatus::Failed).await;
    assert_eq!(failed.error_message.as_deref(), Some(SAVE_FAILED_MESSAGE));

    cancel.cancel();
    handle.await.unwrap();
}
