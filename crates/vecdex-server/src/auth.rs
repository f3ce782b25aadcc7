//! Bearer-token gate (§6 "Authentication"). Applied only to the
//! `/api/v1/*` router; `/health` and `/metrics` are mounted outside it and
//! so are always exempt.

use crate::types::ErrorResponse;
use crate::AppState;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use axum::http::StatusCode;
use std::sync::Arc;

/// Rejects the request with 401 unless `api_keys` is empty (auth disabled)
/// or the request carries `Authorization: Bearer <one of api_keys>`.
pub async fn require_bearer(
    State(state): State<Arc<AppState>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if state.api_keys.is_empty() {
        return next.run(request).await;
    }

    let presented = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if state.api_keys.iter().any(|k| k == token) => next.run(request).await,
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                code: "unauthorized".to_string(),
                message: "missing or invalid bearer token".to_string(),
            }),
        )
            .into_response(),
    }
}
