use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

pub mod error;
pub mod health;
pub mod metrics;
pub mod screenshots;

/// API routes with the standard middleware stack.
///
/// `/metrics` is added by the binary since it needs the recorder handle.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/api/v1/screenshots",
            post(screenshots::submit).get(screenshots::list_jobs),
        )
        .route("/api/v1/screenshots/batch", post(screenshots::submit_batch))
        .route("/api/v1/screenshots/{job_id}", get(screenshots::get_job))
        .route(
            "/api/v1/screenshots/{job_id}/download",
            get(screenshots::download),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(1024 * 1024)) // 1 MB limit
}
