// HTTP routes: platform webhook, health and metrics.

pub mod webhook;

use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::delivery::Messenger;
use crate::metrics;
use crate::workflow::Workflow;

// ── Shared application state ─────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<Workflow>,
    pub messenger: Arc<dyn Messenger>,
    /// Webhook signing secret; `None` skips verification (local mode).
    pub channel_secret: Option<String>,
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_text))
        .route("/callback", post(webhook::callback))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "tetsuoni-bot" }))
}

async fn metrics_text() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}
