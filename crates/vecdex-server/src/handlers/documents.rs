//! `/collections/{c}/documents/*` routes (§6).

use crate::error_map::error_response;
use crate::middleware::with_tokens_header;
use crate::types::{
    DocumentResponse, ErrorResponse, ListDocumentsQuery, ListDocumentsResponse,
    PatchDocumentRequest, UpsertDocumentRequest,
};
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use std::sync::Arc;
use vecdex_core::DocumentPatch;

fn etag(revision: u64) -> HeaderValue {
    HeaderValue::from_str(&format!("\"{revision}\"")).unwrap_or_else(|_| HeaderValue::from_static("\"0\""))
}

/// Parses an `If-Match: "<revision>"` precondition header, if present.
fn if_match_revision(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::IF_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_matches('"'))
        .and_then(|v| v.parse().ok())
}

/// Creates or replaces a document.
#[utoipa::path(
    put,
    path = "/collections/{c}/documents/{id}",
    tag = "documents",
    request_body = UpsertDocumentRequest,
    params(
        ("c" = String, Path, description = "Collection name"),
        ("id" = String, Path, description = "Document id")
    ),
    responses(
        (status = 200, description = "Replaced", body = DocumentResponse),
        (status = 201, description = "Created", body = DocumentResponse),
        (status = 400, description = "Invalid schema", body = ErrorResponse),
        (status = 404, description = "Collection not found", body = ErrorResponse),
        (status = 422, description = "Vector dimension mismatch", body = ErrorResponse)
    )
)]
pub async fn upsert_document(
    State(state): State<Arc<AppState>>,
    Path((collection, id)): Path<(String, String)>,
    Json(req): Json<UpsertDocumentRequest>,
) -> Response {
    match state
        .service
        .documents
        .upsert(&collection, &id, &req.content, req.tags, req.numerics)
        .await
    {
        Ok(outcome) => {
            let status = if outcome.created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            let headers = [(header::ETAG, etag(outcome.document.revision))];
            let body = Json(DocumentResponse::from(outcome.document));
            with_tokens_header((status, headers, body).into_response(), outcome.tokens_used)
        }
        Err(e) => error_response(&e),
    }
}

/// Fetches a document.
#[utoipa::path(
    get,
    path = "/collections/{c}/documents/{id}",
    tag = "documents",
    params(
        ("c" = String, Path, description = "Collection name"),
        ("id" = String, Path, description = "Document id")
    ),
    responses(
        (status = 200, description = "Document", body = DocumentResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Path((collection, id)): Path<(String, String)>,
) -> Response {
    match state.service.documents.get(&collection, &id).await {
        Ok(document) => {
            let headers = [(header::ETAG, etag(document.revision))];
            (headers, Json(DocumentResponse::from(document))).into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// Applies a partial update to a document.
#[utoipa::path(
    patch,
    path = "/collections/{c}/documents/{id}",
    tag = "documents",
    request_body = PatchDocumentRequest,
    params(
        ("c" = String, Path, description = "Collection name"),
        ("id" = String, Path, description = "Document id")
    ),
    responses(
        (status = 200, description = "Patched", body = DocumentResponse),
        (status = 400, description = "Invalid schema", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse),
        (status = 409, description = "Revision conflict", body = ErrorResponse)
    )
)]
pub async fn patch_document(
    State(state): State<Arc<AppState>>,
    Path((collection, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(req): Json<PatchDocumentRequest>,
) -> Response {
    let expected_revision = if_match_revision(&headers);
    let patch = DocumentPatch {
        content: req.content,
        tags: req.tags,
        numerics: req.numerics,
    };
    match state
        .service
        .documents
        .patch(&collection, &id, patch, expected_revision)
        .await
    {
        Ok(outcome) => {
            let out_headers = [(header::ETAG, etag(outcome.document.revision))];
            let body = Json(DocumentResponse::from(outcome.document));
            with_tokens_header((out_headers, body).into_response(), outcome.tokens_used)
        }
        Err(e) => error_response(&e),
    }
}

/// Deletes a document.
#[utoipa::path(
    delete,
    path = "/collections/{c}/documents/{id}",
    tag = "documents",
    params(
        ("c" = String, Path, description = "Collection name"),
        ("id" = String, Path, description = "Document id")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path((collection, id)): Path<(String, String)>,
) -> Response {
    match state.service.documents.delete(&collection, &id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(&e),
    }
}

/// Lists a collection's documents.
#[utoipa::path(
    get,
    path = "/collections/{c}/documents",
    tag = "documents",
    params(
        ("c" = String, Path, description = "Collection name"),
        ("cursor" = Option<String>, Query, description = "Opaque pagination cursor"),
        ("limit" = Option<usize>, Query, description = "Page size")
    ),
    responses(
        (status = 200, description = "Documents", body = ListDocumentsResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    Path(collection): Path<String>,
    Query(query): Query<ListDocumentsQuery>,
) -> Response {
    // §8 "limit=0 treated as default; limit>max clamped to max".
    let limit = match query.limit {
        0 => state.default_page_size,
        n => n.min(state.max_page_size),
    };
    match state
        .service
        .documents
        .list(&collection, query.cursor.as_deref(), limit)
        .await
    {
        Ok((documents, next_cursor)) => {
            let has_more = next_cursor.is_some();
            Json(ListDocumentsResponse {
                items: documents.into_iter().map(DocumentResponse::from).collect(),
                next_cursor,
                has_more,
            })
            .into_response()
        }
        Err(e) => error_response(&e),
    }
}
