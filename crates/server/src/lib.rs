//! HTTP surface for the client churn backend.

use axum::extract::DefaultBodyLimit;
use axum::Router;
use churn_core::pipeline::IngestContext;
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod error;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub ingest: IngestContext,
}

impl AppState {
    pub fn new(ingest: IngestContext) -> Self {
        Self { ingest }
    }

    pub fn db(&self) -> &SqlitePool {
        &self.ingest.pool
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.ingest.config.storage.max_upload_bytes;
    Router::new()
        .merge(api::client_routes())
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
