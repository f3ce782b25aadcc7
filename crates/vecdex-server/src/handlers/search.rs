//! `POST /collections/{c}/documents/search` (§6, §4.5).

use crate::error_map::error_response;
use crate::types::{ErrorResponse, GeoQueryDto, SearchHitResponse, SearchRequestBody, SearchResponse};
use crate::AppState;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json, Response};
use std::sync::Arc;
use vecdex_core::{Error, SearchMode, SearchRequest};

fn parse_mode(mode: &str) -> Result<SearchMode, Error> {
    match mode {
        "semantic" => Ok(SearchMode::Semantic),
        "keyword" => Ok(SearchMode::Keyword),
        "hybrid" => Ok(SearchMode::Hybrid),
        "geo" => Ok(SearchMode::Geo),
        other => Err(Error::InvalidSchema(format!("unknown search mode '{other}'"))),
    }
}

/// Runs a search against a collection.
#[utoipa::path(
    post,
    path = "/collections/{c}/documents/search",
    tag = "search",
    request_body = SearchRequestBody,
    params(("c" = String, Path, description = "Collection name")),
    responses(
        (status = 200, description = "Search hits", body = SearchResponse),
        (status = 400, description = "Invalid schema", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse),
        (status = 501, description = "Keyword search not supported", body = ErrorResponse)
    )
)]
pub async fn search(
    State(state): State<Arc<AppState>>,
    Path(collection): Path<String>,
    Json(body): Json<SearchRequestBody>,
) -> Response {
    let mode = match body.mode.as_deref().map(parse_mode) {
        Some(Ok(mode)) => Some(mode),
        Some(Err(e)) => return error_response(&e),
        None => None,
    };

    let request = SearchRequest {
        query: body.query,
        mode,
        filters: body.filters.into_filter(),
        geo: body.geo.map(GeoQueryDto::into_geo_query),
        top_k: body.top_k,
        limit: body.limit,
        min_score: body.min_score,
        include_vectors: body.include_vectors,
    };

    match state.service.search.search(&collection, request).await {
        Ok(hits) => {
            let items: Vec<SearchHitResponse> = hits.into_iter().map(Into::into).collect();
            Json(SearchResponse { items }).into_response()
        }
        Err(e) => error_response(&e),
    }
}
