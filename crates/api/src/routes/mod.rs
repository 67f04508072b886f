//! API route handlers

pub mod billing;
pub mod downloads;
pub mod sweep;
pub mod webhooks;

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::state::AppState;

/// Build the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhooks/gateway", post(webhooks::gateway_webhook))
        .route("/billing/checkout", post(billing::checkout))
        .route("/billing/reconcile", post(billing::reconcile))
        .route("/downloads/quota", get(downloads::quota_status))
        .route("/downloads/{resource_id}", post(downloads::record_download))
        .route("/internal/sweep/expire", get(sweep::run_expiration))
        .route("/internal/sweep/notify", get(sweep::run_expiry_notices))
        .with_state(state)
}

/// Health check endpoint
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
