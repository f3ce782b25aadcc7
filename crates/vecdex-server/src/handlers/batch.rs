//! `/collections/{c}/documents/batch-*` routes (§4.6, §6).

use crate::error_map::error_response;
use crate::types::{BatchDeleteRequest, BatchResponse, BatchUpsertRequest, ErrorResponse};
use crate::AppState;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json, Response};
use std::sync::Arc;
use vecdex_core::BatchUpsertItem;

/// Batch upserts documents, validating/vectorizing each independently and
/// reporting a per-item result (§4.6).
#[utoipa::path(
    post,
    path = "/collections/{c}/documents/batch-upsert",
    tag = "batch",
    request_body = BatchUpsertRequest,
    params(("c" = String, Path, description = "Collection name")),
    responses(
        (status = 200, description = "Per-item results", body = BatchResponse),
        (status = 400, description = "Invalid schema or oversized batch", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn batch_upsert(
    State(state): State<Arc<AppState>>,
    Path(collection): Path<String>,
    Json(req): Json<BatchUpsertRequest>,
) -> Response {
    let items = req
        .documents
        .into_iter()
        .map(|d| BatchUpsertItem {
            id: d.id,
            content: d.content,
            tags: d.tags,
            numerics: d.numerics,
        })
        .collect();

    match state.service.batch.upsert(&collection, items).await {
        Ok(report) => Json(BatchResponse::from(report)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Batch deletes documents by id, reporting a per-item result (§4.6).
#[utoipa::path(
    post,
    path = "/collections/{c}/documents/batch-delete",
    tag = "batch",
    request_body = BatchDeleteRequest,
    params(("c" = String, Path, description = "Collection name")),
    responses(
        (status = 200, description = "Per-item results", body = BatchResponse),
        (status = 400, description = "Invalid schema or oversized batch", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn batch_delete(
    State(state): State<Arc<AppState>>,
    Path(collection): Path<String>,
    Json(req): Json<BatchDeleteRequest>,
) -> Response {
    match state.service.batch.delete(&collection, req.ids).await {
        Ok(report) => Json(BatchResponse::from(report)).into_response(),
        Err(e) => error_response(&e),
    }
}
