//! `/collections` routes (§6).

use crate::error_map::error_response;
use crate::types::{
    CollectionResponse, CreateCollectionRequest, ErrorResponse, FieldDto, ListCollectionsResponse,
};
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use std::sync::Arc;
use vecdex_core::CollectionType;

fn etag(revision: u64) -> HeaderValue {
    HeaderValue::from_str(&format!("\"{revision}\"")).unwrap_or_else(|_| HeaderValue::from_static("\"0\""))
}

/// Creates a collection.
#[utoipa::path(
    post,
    path = "/collections",
    tag = "collections",
    request_body = CreateCollectionRequest,
    responses(
        (status = 201, description = "Created", body = CollectionResponse),
        (status = 400, description = "Invalid schema", body = ErrorResponse),
        (status = 409, description = "Already exists", body = ErrorResponse)
    )
)]
pub async fn create_collection(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCollectionRequest>,
) -> Response {
    let collection_type = match CollectionType::parse(&req.collection_type) {
        Some(t) => t,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    code: "invalid_schema".to_string(),
                    message: format!("unknown collection type '{}'", req.collection_type),
                }),
            )
                .into_response()
        }
    };

    let fields = match req
        .fields
        .into_iter()
        .map(FieldDto::into_field)
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(f) => f,
        Err(message) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    code: "invalid_schema".to_string(),
                    message,
                }),
            )
                .into_response()
        }
    };

    let vector_dim = match collection_type {
        CollectionType::Geo => 3,
        CollectionType::Text => match req.vector_dim {
            Some(dim) => dim,
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse {
                        code: "invalid_schema".to_string(),
                        message: "vectorDim is required for text collections".to_string(),
                    }),
                )
                    .into_response()
            }
        },
    };

    let created_at = chrono::Utc::now().timestamp_millis();
    match state
        .service
        .collections
        .create(&req.name, collection_type, fields, vector_dim, created_at)
        .await
    {
        Ok(collection) => {
            let headers = [(header::ETAG, etag(collection.revision))];
            (StatusCode::CREATED, headers, Json(CollectionResponse::from(collection))).into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// Lists every collection.
#[utoipa::path(
    get,
    path = "/collections",
    tag = "collections",
    responses((status = 200, description = "Collections", body = ListCollectionsResponse))
)]
pub async fn list_collections(State(state): State<Arc<AppState>>) -> Response {
    match state.service.collections.list().await {
        Ok(collections) => Json(ListCollectionsResponse {
            items: collections.into_iter().map(CollectionResponse::from).collect(),
        })
        .into_response(),
        Err(e) => error_response(&e),
    }
}

/// Fetches a collection.
#[utoipa::path(
    get,
    path = "/collections/{name}",
    tag = "collections",
    params(("name" = String, Path, description = "Collection name")),
    responses(
        (status = 200, description = "Collection", body = CollectionResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn get_collection(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    match state.service.collections.get(&name).await {
        Ok(collection) => {
            let headers = [(header::ETAG, etag(collection.revision))];
            (headers, Json(CollectionResponse::from(collection))).into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// Deletes a collection.
#[utoipa::path(
    delete,
    path = "/collections/{name}",
    tag = "collections",
    params(("name" = String, Path, description = "Collection name")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn delete_collection(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    match state.service.collections.delete(&name).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(&e),
    }
}
