//! Vecdex Server - REST API for vector index management.
//!
//! This crate provides the HTTP handlers and types for the Vecdex API.
//!
//! ## OpenAPI Documentation
//!
//! The API is documented using OpenAPI 3.0. Access the interactive
//! documentation at:
//! - Swagger UI: `GET /swagger-ui`
//! - OpenAPI JSON: `GET /api-docs/openapi.json`

mod auth;
mod error_map;
mod handlers;
mod middleware;
mod types;

use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use utoipa::OpenApi;
use vecdex_core::VecdexConfig;
use vecdex_core::VecdexService;

pub use types::*;

pub use handlers::{
    batch_delete, batch_upsert, create_collection, delete_collection, delete_document,
    get_collection, get_document, get_usage, health_check, list_collections, list_documents,
    metrics, patch_document, search, upsert_document,
};

/// Shared application state: the wired [`VecdexService`] plus the
/// server-facing config this edge needs directly (auth keys, paging
/// defaults).
pub struct AppState {
    /// The wired collection/document/search/batch/usage services.
    pub service: Arc<VecdexService>,
    /// Acceptable bearer API keys. Empty disables auth.
    pub api_keys: Vec<String>,
    /// Page size used when a list request doesn't specify one.
    pub default_page_size: usize,
    /// Maximum page size a list request may specify.
    pub max_page_size: usize,
    /// Per-request deadline (§5); past this the handler is cancelled.
    pub request_timeout: Duration,
}

impl AppState {
    /// Builds the shared state from a connected service and its config.
    #[must_use]
    pub fn new(service: Arc<VecdexService>, config: &VecdexConfig) -> Self {
        Self {
            service,
            api_keys: config.server.api_keys.clone(),
            default_page_size: config.paging.default_page_size,
            max_page_size: config.paging.max_page_size,
            request_timeout: Duration::from_millis(config.server.request_timeout_ms),
        }
    }
}

/// Vecdex API documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Vecdex API",
        version = "0.1.0",
        description = "Vector index management: semantic, keyword, hybrid, and geo search \
            over a Redis-Stack-compatible backend.",
        license(name = "Apache-2.0")
    ),
    servers(
        (url = "/api/v1", description = "Vecdex API v1")
    ),
    tags(
        (name = "health", description = "Health and metrics"),
        (name = "collections", description = "Collection management"),
        (name = "documents", description = "Document CRUD"),
        (name = "search", description = "Semantic/keyword/hybrid/geo search"),
        (name = "batch", description = "Batch document operations"),
        (name = "usage", description = "Embedding usage and budget reporting")
    ),
    paths(
        handlers::health::health_check,
        handlers::health::metrics,
        handlers::collections::list_collections,
        handlers::collections::create_collection,
        handlers::collections::get_collection,
        handlers::collections::delete_collection,
        handlers::documents::upsert_document,
        handlers::documents::get_document,
        handlers::documents::patch_document,
        handlers::documents::delete_document,
        handlers::documents::list_documents,
        handlers::search::search,
        handlers::batch::batch_upsert,
        handlers::batch::batch_delete,
        handlers::usage::get_usage
    ),
    components(
        schemas(
            CreateCollectionRequest,
            CollectionResponse,
            ListCollectionsResponse,
            FieldDto,
            UpsertDocumentRequest,
            PatchDocumentRequest,
            DocumentResponse,
            ListDocumentsResponse,
            SearchRequestBody,
            SearchResponse,
            SearchHitResponse,
            GeoQueryDto,
            FilterDto,
            FilterConditionDto,
            BatchUpsertRequest,
            BatchUpsertDocumentDto,
            BatchDeleteRequest,
            BatchResponse,
            BatchItemResponse,
            UsageResponse,
            HealthResponse,
            ErrorResponse
        )
    )
)]
pub struct ApiDoc;

/// Builds the full router: `/api/v1/*` behind the bearer gate, plus
/// `/health` and `/metrics` always exempt (§6), plus Swagger UI.
#[must_use]
pub fn build_router(state: Arc<AppState>) -> Router {
    let api_v1 = Router::new()
        .route("/collections", get(list_collections).post(create_collection))
        .route(
            "/collections/{name}",
            get(get_collection).delete(delete_collection),
        )
        .route(
            "/collections/{c}/documents/{id}",
            put(upsert_document).get(get_document).patch(patch_document).delete(delete_document),
        )
        .route("/collections/{c}/documents", get(list_documents))
        .route("/collections/{c}/documents/search", post(search))
        .route("/collections/{c}/documents/batch-upsert", post(batch_upsert))
        .layer(DefaultBodyLimit::max(16 * 1024 * 1024))
        .route("/collections/{c}/documents/batch-delete", post(batch_delete))
        .route("/usage", get(get_usage))
        .route_layer(from_fn_with_state(state.clone(), auth::require_bearer))
        .layer(from_fn_with_state(state.clone(), middleware::deadline))
        .with_state(state.clone());

    let exempt = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .with_state(state);

    let swagger_ui =
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi());

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(exempt)
        .merge(Router::<()>::new().merge(swagger_ui))
        .layer(from_fn(middleware::request_id))
}
