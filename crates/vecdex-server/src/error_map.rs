//! Maps [`vecdex_core::Error`] to an HTTP status and a stable error body
//! (§6, §7).

use crate::types::ErrorResponse;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use vecdex_core::Error;

/// Renders `err` as the `(status, body)` pair the HTTP edge returns for it.
/// `InternalError` never leaks its detail; everything else carries
/// `err.to_string()` as `message`.
pub fn map_error(err: &Error) -> (StatusCode, ErrorResponse) {
    let status = match err {
        Error::NotFound(_) | Error::DocumentNotFound(..) => StatusCode::NOT_FOUND,
        Error::AlreadyExists(_) => StatusCode::CONFLICT,
        Error::InvalidSchema(_) | Error::GeoQueryInvalid(_) => StatusCode::BAD_REQUEST,
        Error::VectorDimMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        Error::RevisionConflict { .. } => StatusCode::CONFLICT,
        Error::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        Error::EmbeddingQuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
        Error::EmbeddingProviderError(_) => StatusCode::BAD_GATEWAY,
        Error::KeywordSearchNotSupported => StatusCode::NOT_IMPLEMENTED,
        Error::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
        Error::Cancelled => StatusCode::REQUEST_TIMEOUT,
        Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let message = if matches!(err, Error::Internal(_)) {
        tracing::error!(error = %err, "internal error");
        "internal error".to_string()
    } else {
        err.to_string()
    };

    (
        status,
        ErrorResponse {
            code: err.code().to_string(),
            message,
        },
    )
}

/// Converts an error directly into an axum [`Response`], for handlers that
/// don't need the status/body pair separately.
pub fn error_response(err: &Error) -> Response {
    let (status, body) = map_error(err);
    (status, Json(body)).into_response()
}
