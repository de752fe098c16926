use axum::routing::{get, post};
use axum::Router;

use crate::app_state::AppState;

pub mod auth;
pub mod health;
pub mod metrics;
pub mod thumbnail;

/// Health check plus the thumbnail job API, with state applied.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/thumbnail", post(thumbnail::create_thumbnail_job))
        .route(
            "/api/thumbnail/{job_id}/status",
            get(thumbnail::get_job_status),
        )
        .with_state(state)
}
