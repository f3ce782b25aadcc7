//! Request-id propagation (§6 "`X-Request-ID` echoed") and per-request
//! deadlines (§5).

use crate::error_map::error_response;
use crate::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;
use vecdex_core::{scoped, CancellationToken, Error};

const REQUEST_ID_HEADER: &str = "x-request-id";
const EMBEDDING_TOKENS_HEADER: &str = "x-embedding-tokens";

/// Stamps `X-Embedding-Tokens` on a handler's response when the operation
/// billed at least one token (§6).
pub fn with_tokens_header(mut response: Response, tokens: u64) -> Response {
    if tokens > 0 {
        if let Ok(value) = HeaderValue::from_str(&tokens.to_string()) {
            response.headers_mut().insert(EMBEDDING_TOKENS_HEADER, value);
        }
    }
    response
}

/// Echoes an incoming `X-Request-ID`, or generates a fresh UUID v4 if the
/// caller didn't send one, and stamps it on the response.
pub async fn request_id(request: Request<Body>, next: Next) -> Response {
    let incoming = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut response = next.run(request).await;

    let id = incoming.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Scopes the request to a fresh [`CancellationToken`] (§5) and races the
/// handler against `state.request_timeout`. On timeout the token is
/// cancelled, so any `cancellable()` call still in flight inside
/// `vecdex-core` abandons its storage/embedding I/O and surfaces
/// [`Error::Cancelled`]; the client gets the same mapped `408` either way.
pub async fn deadline(State(state): State<Arc<AppState>>, request: Request<Body>, next: Next) -> Response {
    let token = CancellationToken::new();
    let racer = token.clone();
    let handler = scoped(token.clone(), next.run(request));

    tokio::select! {
        biased;
        () = tokio::time::sleep(state.request_timeout) => {
            racer.cancel();
            error_response(&Error::Cancelled)
        }
        response = handler => response,
    }
}
