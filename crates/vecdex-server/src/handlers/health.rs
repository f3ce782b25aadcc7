//! `GET /health` and `GET /metrics` — always exempt from auth (§6).

use crate::types::HealthResponse;
use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use std::sync::Arc;

/// Reports whether the storage backend is reachable.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Backend reachable", body = HealthResponse),
        (status = 503, description = "Backend unreachable", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.service.storage.get("__vecdex_health__").await {
        Ok(_) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok".to_string(),
            }),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unavailable".to_string(),
            }),
        ),
    }
}

/// Renders process metrics in Prometheus text exposition format.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "health",
    responses(
        (status = 200, description = "Prometheus text exposition", body = String)
    )
)]
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.service.metrics.render_prometheus()
}
