use std::sync::Arc;

use crate::db::JobStore;
use crate::services::{auth::JwtAuth, queue::JobQueue};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub queue: JobQueue,
    pub auth: Arc<JwtAuth>,
}

impl AppState {
    pub fn new(store: Arc<dyn JobStore>, queue: JobQueue, auth: JwtAuth) -> Self {
        Self {
            store,
            queue,
            auth: Arc::new(auth),
        }
    }
}
