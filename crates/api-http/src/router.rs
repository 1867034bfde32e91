//! Route table and shared state

use crate::handlers;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use parcel_core::application::{StatusService, SubmissionService};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub submission: Arc<SubmissionService>,
    pub status: Arc<StatusService>,
}

impl AppState {
    pub fn new(submission: Arc<SubmissionService>, status: Arc<StatusService>) -> Self {
        Self { submission, status }
    }
}

/// Build the gateway router; bodies above `max_upload_bytes` get `413`
pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/upload", post(handlers::upload))
        .route("/result/{job_id}", get(handlers::result))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
