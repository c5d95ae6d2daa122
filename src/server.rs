use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_mw,
    routing::{any, get},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers;
use crate::middleware::timing;
use crate::AppState;

/// Builds the full Axum `Router` with all routes and middleware.
/// `body_limit` caps the size of an ingest body in bytes.
pub fn create_router(state: Arc<AppState>, body_limit: usize) -> Router {
    Router::new()
        // ── Ingest ──────────────────────────────────────────────
        // `any` so that other methods reach the handler and get a 405
        // with the usual JSON error body.
        .route("/samples/", any(handlers::samples::ingest_samples))
        .route("/samples", any(handlers::samples::ingest_samples))
        // ── Diagnostics ─────────────────────────────────────────
        .route("/api/samples", get(handlers::samples::get_samples))
        // ── Provide shared state to all routes above ────────────
        .with_state(state)
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(axum_mw::from_fn(timing::timing_middleware))
        .layer(CorsLayer::permissive())
}
