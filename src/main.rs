use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use thumbnail_gen::{
    app_state::AppState,
    config::AppConfig,
    db::{self, memory::MemoryJobStore, JobStore, PgJobStore},
    routes,
    services::{
        auth::JwtAuth,
        generation::{GeminiClient, GenerationProvider},
        queue::job_queue,
        recovery,
        worker::JobWorker,
    },
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing thumbnail-gen server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    metrics::describe_counter!(
        "thumbnail_jobs_submitted_total",
        "Total thumbnail jobs accepted"
    );
    metrics::describe_counter!(
        "thumbnail_jobs_completed_total",
        "Total thumbnail jobs completed"
    );
    metrics::describe_counter!(
        "thumbnail_jobs_failed_total",
        "Total thumbnail jobs that failed"
    );
    metrics::describe_counter!(
        "thumbnail_jobs_rejected_total",
        "Submissions rejected because the queue was full"
    );
    metrics::describe_histogram!(
        "thumbnail_generation_seconds",
        "Time spent generating images for one job"
    );
    metrics::describe_gauge!(
        "thumbnail_queue_depth",
        "Job ids waiting in the work queue"
    );

    // Job store: PostgreSQL when configured, otherwise in memory
    let store: Arc<dyn JobStore> = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to PostgreSQL database");
            let pool = db::init_pool(database_url)
                .await
                .expect("Failed to connect to database");

            tracing::info!("Running database migrations");
            db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");

            Arc::new(PgJobStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, jobs will be kept in memory only");
            Arc::new(MemoryJobStore::new())
        }
    };

    tracing::info!("Initializing Gemini generation client");
    let provider: Arc<dyn GenerationProvider> = Arc::new(
        GeminiClient::new(
            &config.gemini_base_url,
            &config.gemini_model,
            &config.gemini_api_key,
            Duration::from_secs(config.generation_timeout_secs),
        )
        .expect("Failed to initialize Gemini client"),
    );

    let auth = JwtAuth::new(&config.jwt_secret).expect("Failed to initialize JWT validation");

    let (queue, receiver) = job_queue(config.queue_capacity);

    // Jobs left over from a previous process have no queue entry any more
    let report = recovery::reconcile_orphaned_jobs(
        store.as_ref(),
        &queue,
        config.recovery_policy,
        config.recovery_stale_after(),
    )
    .await
    .expect("Failed to reconcile orphaned jobs");
    tracing::info!(
        requeued = report.requeued,
        failed = report.failed,
        "Startup reconciliation complete"
    );

    let shutdown = CancellationToken::new();

    let worker = JobWorker::new(store.clone(), provider, config.worker_config());
    let worker_handle = tokio::spawn(worker.run(receiver, shutdown.clone()));

    let state = AppState::new(store, queue, auth);

    let app = Router::new()
        .merge(routes::api_router(state))
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes));

    tracing::info!("Starting thumbnail-gen on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .expect("Server error");

    // Let the worker finish the job it is on
    shutdown.cancel();
    if let Err(e) = worker_handle.await {
        tracing::error!(error = %e, "Worker task ended abnormally");
    }

    tracing::info!("Shutdown complete");
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = shutdown.cancelled() => {},
    }

    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
