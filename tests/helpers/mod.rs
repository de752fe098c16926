//! Shared fixtures for the integration tests: in-memory state, tokens and
//! scripted generation providers.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response};
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use thumbnail_gen::{
    app_state::AppState,
    db::{memory::MemoryJobStore, JobStore, StoreError},
    models::job::{JobStatus, ThumbnailJob},
    services::{
        auth::JwtAuth,
        generation::{GenerationProvider, ProviderError},
        queue::{job_queue, JobQueue, JobReceiver},
        worker::WorkerConfig,
    },
};

pub const JWT_SECRET: &str = "integration-test-secret";

/// 1x1 transparent PNG.
pub const PNG_BASE64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryJobStore>,
    pub queue: JobQueue,
    pub receiver: JobReceiver,
}

pub fn test_app(queue_capacity: usize) -> TestApp {
    let store = Arc::new(MemoryJobStore::new());
    let (queue, receiver) = job_queue(queue_capacity);
    let auth = JwtAuth::new(JWT_SECRET).unwrap();
    let state = AppState::new(store.clone(), queue.clone(), auth);
    TestApp {
        state,
        store,
        queue,
        receiver,
    }
}

pub fn token_for(user: &str) -> String {
    JwtAuth::new(JWT_SECRET)
        .unwrap()
        .issue_token(user, chrono::Duration::hours(1))
        .unwrap()
}

pub fn fast_worker_config() -> WorkerConfig {
    WorkerConfig {
        max_results: 2,
        generation_timeout: Duration::from_secs(5),
        error_backoff: Duration::from_millis(10),
    }
}

pub fn create_request(user: &str, body: serde_json::Value) -> Request<Body> {
    Request::post("/api/thumbnail")
        .header(header::AUTHORIZATION, format!("Bearer {}", token_for(user)))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn status_request(user: &str, job_id: Uuid) -> Request<Body> {
    Request::get(format!("/api/thumbnail/{job_id}/status"))
        .header(header::AUTHORIZATION, format!("Bearer {}", token_for(user)))
        .body(Body::empty())
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Poll the store until the job reaches `status` or two seconds pass.
pub async fn wait_for_status(store: &dyn JobStore, job_id: Uuid, status: JobStatus) -> ThumbnailJob {
    for _ in 0..200 {
        if let Some(job) = store.find(job_id).await.unwrap() {
            if job.status == status {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} never reached {status}");
}

pub fn data_url(n: usize) -> String {
    format!("data:image/png;base64,{PNG_BASE64}#{n}")
}

/// Returns the same images for every job and records the prompts it saw.
#[derive(Default)]
pub struct FixedProvider {
    pub images: Vec<String>,
    pub prompts: Mutex<Vec<String>>,
}

impl FixedProvider {
    pub fn new(count: usize) -> Self {
        Self {
            images: (0..count).map(data_url).collect(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationProvider for FixedProvider {
    async fn generate(
        &self,
        prompt: &str,
        _input_image: Option<&str>,
        _count: usize,
    ) -> Result<Vec<String>, ProviderError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.images.clone())
    }
}

pub struct FailingProvider {
    pub message: String,
}

#[async_trait]
impl GenerationProvider for FailingProvider {
    async fn generate(
        &self,
        _prompt: &str,
        _input_image: Option<&str>,
        _count: usize,
    ) -> Result<Vec<String>, ProviderError> {
        Err(ProviderError::Rejected {
            status: Some(429),
            message: self.message.clone(),
        })
    }
}

pub struct SlowProvider {
    pub delay: Duration,
}

#[async_trait]
impl GenerationProvider for SlowProvider {
    async fn generate(
        &self,
        _prompt: &str,
        _input_image: Option<&str>,
        count: usize,
    ) -> Result<Vec<String>, ProviderError> {
        tokio::time::sleep(self.delay).await;
        Ok((0..count).map(data_url).collect())
    }
}

pub struct PanickingProvider;

#[async_trait]
impl GenerationProvider for PanickingProvider {
    async fn generate(
        &self,
        _prompt: &str,
        _input_image: Option<&str>,
        _count: usize,
    ) -> Result<Vec<String>, ProviderError> {
        panic!("provider exploded");
    }
}

/// Wraps a memory store and fails the first `failures` lookups.
pub struct FlakyStore {
    pub inner: MemoryJobStore,
    failures: AtomicUsize,
}

impl FlakyStore {
    pub fn new(failures: usize) -> Self {
        Self {
            inner: MemoryJobStore::new(),
            failures: AtomicUsize::new(failures),
        }
    }

    fn trip(&self) -> Result<(), StoreError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for FlakyStore {
    async fn create(&self, job: &ThumbnailJob) -> Result<(), StoreError> {
        self.inner.create(job).await
    }

    async fn find(&self, id: Uuid) -> Result<Option<ThumbnailJob>, StoreError> {
        self.trip()?;
        self.inner.find(id).await
    }

    async fn find_owned(&self, id: Uuid, owner: &str) -> Result<Option<ThumbnailJob>, StoreError> {
        self.inner.find_owned(id, owner).await
    }

    async fn update(&self, job: &ThumbnailJob) -> Result<(), StoreError> {
        self.inner.update(job).await
    }

    async fn list_unfinished(
        &self,
        created_before: DateTime<Utc>,
    ) -> Result<Vec<ThumbnailJob>, StoreError> {
        self.inner.list_unfinished(created_before).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.trip()
    }
}

/// Fails exactly the `fail_on`-th call to `update` (1-based).
pub struct FailingUpdateStore {
    pub inner: MemoryJobStore,
    fail_on: usize,
    updates: AtomicUsize,
}

impl FailingUpdateStore {
    pub fn new(fail_on: usize) -> Self {
        Self {
            inner: MemoryJobStore::new(),
            fail_on,
            updates: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl JobStore for FailingUpdateStore {
    async fn create(&self, job: &ThumbnailJob) -> Result<(), StoreError> {
        self.inner.create(job).await
    }

    async fn find(&self, id: Uuid) -> Result<Option<ThumbnailJob>, StoreError> {
        self.inner.find(id).await
    }

    async fn find_owned(&self, id: Uuid, owner: &str) -> Result<Option<ThumbnailJob>, StoreError> {
        self.inner.find_owned(id, owner).await
    }

    async fn update(&self, job: &ThumbnailJob) -> Result<(), StoreError> {
        if self.updates.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.update(job).await
    }

    async fn list_unfinished(
        &self,
        created_before: DateTime<Utc>,
    ) -> Result<Vec<ThumbnailJob>, StoreError> {
        self.inner.list_unfinished(created_before).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Blocks inside `generate` until released, signalling when it gets there.
#[derive(Default)]
pub struct GatedProvider {
    pub started: tokio::sync::Notify,
    pub release: tokio::sync::Notify,
}

#[async_trait]
impl GenerationProvider for GatedProvider {
    async fn generate(
        &self,
        _prompt: &str,
        _input_image: Option<&str>,
        count: usize,
    ) -> Result<Vec<String>, ProviderError> {
        self.started.notify_one();
        self.release.notified().await;
        Ok((0..count).map(data_url).collect())
    }
}
