//! SearchPlanner: mode dispatch, query embedding, RRF fusion, geo
//! post-filtering, and result materialization (§4.5).

use super::fusion::reciprocal_rank_fusion;
use crate::collection::CollectionManager;
use crate::embedding::EmbeddingPipeline;
use crate::error::{Error, Result};
use crate::geo;
use crate::model::collection::{Collection, CollectionType};
use crate::model::document::{document_key_prefix, index_name, Document};
use crate::storage::{Bm25Request, Filter, KnnRequest, StorageAdapter};
use std::collections::HashMap;
use std::sync::Arc;

/// Default candidate pool size when the caller omits `topK`.
pub const DEFAULT_TOP_K: usize = 20;
/// Ceiling on `topK`.
pub const MAX_TOP_K: usize = 1000;
/// Default page size when the caller omits `limit`.
pub const DEFAULT_LIMIT: usize = 20;
/// Ceiling on `limit`.
pub const MAX_LIMIT: usize = 100;

/// Which retrieval strategy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Dense-vector KNN only.
    Semantic,
    /// BM25 keyword only.
    Keyword,
    /// KNN and BM25 run concurrently, fused via RRF.
    Hybrid,
    /// Geo proximity: ECEF KNN candidate pool, Haversine post-filter.
    Geo,
}

/// The reserved geo query a geo-mode search requires (§4.5).
#[derive(Debug, Clone)]
pub struct GeoQuery {
    /// Query point latitude, degrees.
    pub latitude: f64,
    /// Query point longitude, degrees.
    pub longitude: f64,
    /// Search radius, meters.
    pub radius_meters: f64,
}

/// A search request. `geo` carries the reserved geo query out-of-band from
/// `filters`, since the filter AST (§4.1) has no representation for a
/// proximity clause — the HTTP edge is responsible for lifting it out of
/// the wire request's `filters.must` array into this field.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    /// Query text (semantic/keyword/hybrid).
    pub query: Option<String>,
    /// Explicit mode; defaults per collection type (§4.5).
    pub mode: Option<SearchMode>,
    /// Tag/numeric filters, ANDed/ORed/negated per §4.1.
    pub filters: Filter,
    /// Required for geo mode.
    pub geo: Option<GeoQuery>,
    /// Candidate pool size for KNN/BM25 legs.
    pub top_k: Option<usize>,
    /// Page size of the returned result list.
    pub limit: Option<usize>,
    /// Post-fusion score floor (ignored in geo mode; see `search`).
    pub min_score: Option<f32>,
    /// Whether to include the stored vector in each hit.
    pub include_vectors: bool,
}

/// One materialized search result (§4.5 "Result materialization").
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Document id.
    pub id: String,
    /// Similarity score (semantic/hybrid), BM25 relevance (keyword), or
    /// distance in meters ascending (geo).
    pub score: f32,
    /// Document content.
    pub content: String,
    /// User tag fields.
    pub tags: HashMap<String, String>,
    /// User numeric fields.
    pub numerics: HashMap<String, f64>,
    /// Present iff `include_vectors` was set.
    pub vector: Option<Vec<f32>>,
}

/// Dispatches search requests by mode, runs hybrid fan-out and RRF fusion,
/// and performs geo candidate retrieval plus Haversine post-filtering
/// (§4.5).
pub struct SearchPlanner {
    storage: Arc<dyn StorageAdapter>,
    collections: Arc<CollectionManager>,
    query_embedder: Arc<dyn EmbeddingPipeline>,
    key_prefix: String,
}

impl SearchPlanner {
    /// Builds a planner over `storage`/`collections`, using `query_embedder`
    /// as the query-side embedding pipeline (§4.2 "two independent pipeline
    /// instances").
    #[must_use]
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        collections: Arc<CollectionManager>,
        query_embedder: Arc<dyn EmbeddingPipeline>,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            collections,
            query_embedder,
            key_prefix: key_prefix.into(),
        }
    }

    fn resolve_mode(&self, collection: &Collection, requested: Option<SearchMode>) -> SearchMode {
        let mode = requested.unwrap_or(match collection.collection_type {
            CollectionType::Geo => SearchMode::Geo,
            CollectionType::Text if self.storage.supports_bm25() => SearchMode::Hybrid,
            CollectionType::Text => SearchMode::Semantic,
        });
        // Hybrid degrades to semantic-only when the backend can't run BM25
        // at all (§4.5 "if BM25 unsupported, fall back to semantic").
        if mode == SearchMode::Hybrid && !self.storage.supports_bm25() {
            SearchMode::Semantic
        } else {
            mode
        }
    }

    // §8 "limit=0 treated as default; limit>max clamped to max" — applies
    // uniformly to topK and limit, so neither ever rejects a request.
    fn resolve_top_k(top_k: Option<usize>) -> usize {
        match top_k {
            None | Some(0) => DEFAULT_TOP_K,
            Some(v) => v.min(MAX_TOP_K),
        }
    }

    fn resolve_limit(limit: Option<usize>) -> usize {
        match limit {
            None | Some(0) => DEFAULT_LIMIT,
            Some(v) => v.min(MAX_LIMIT),
        }
    }

    fn materialize(
        key: &str,
        key_prefix: &str,
        score: f32,
        payload: Option<serde_json::Value>,
        include_vectors: bool,
    ) -> Result<SearchHit> {
        let id = key.strip_prefix(key_prefix).unwrap_or(key).to_string();
        let body = payload
            .ok_or_else(|| Error::Internal(format!("search hit '{key}' returned no payload")))?;
        let doc = Document::from_json_body(&id, &body)?;
        Ok(SearchHit {
            id,
            score,
            content: doc.content,
            tags: doc.tags,
            numerics: doc.numerics,
            vector: include_vectors.then_some(doc.vector),
        })
    }

    /// Runs a search against `collection_name` (§4.5).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the collection doesn't exist,
    /// [`Error::KeywordSearchNotSupported`] for an explicit keyword
    /// request against a non-BM25 backend, [`Error::GeoQueryInvalid`] for a
    /// malformed or missing geo query on a geo-mode search, or
    /// [`Error::InvalidSchema`] for a missing query on a text mode.
    /// `topK`/`limit` are never rejected: `0` substitutes the default and
    /// anything over the ceiling is clamped to it (§8).
    pub async fn search(&self, collection_name: &str, request: SearchRequest) -> Result<Vec<SearchHit>> {
        let collection = self.collections.get(collection_name).await?;
        let mode = self.resolve_mode(&collection, request.mode);
        let top_k = Self::resolve_top_k(request.top_k);
        let limit = Self::resolve_limit(request.limit);
        let idx = index_name(&self.key_prefix, collection_name);
        let key_prefix = document_key_prefix(&self.key_prefix, collection_name);
        let filter_string = request.filters.compile()?;

        let mut hits = match mode {
            SearchMode::Semantic => {
                let query_text = request
                    .query
                    .as_deref()
                    .ok_or_else(|| Error::InvalidSchema("semantic search requires a query".to_string()))?;
                let embed = crate::cancel::cancellable(self.query_embedder.embed(query_text)).await?;
                let docs = crate::cancel::cancellable(self.storage.knn(KnnRequest {
                    index: idx,
                    vector: embed.embedding,
                    k: top_k,
                    filters: filter_string,
                    return_fields: vec!["$".to_string()],
                    raw_scores: false,
                }))
                .await?;
                docs.into_iter()
                    .map(|d| Self::materialize(&d.key, &key_prefix, d.score, d.payload, request.include_vectors))
                    .collect::<Result<Vec<_>>>()?
            }
            SearchMode::Keyword => {
                if !self.storage.supports_bm25() {
                    return Err(Error::KeywordSearchNotSupported);
                }
                let query_text = request
                    .query
                    .clone()
                    .ok_or_else(|| Error::InvalidSchema("keyword search requires a query".to_string()))?;
                let docs = crate::cancel::cancellable(self.storage.bm25(Bm25Request {
                    index: idx,
                    query: query_text,
                    top_k,
                    filters: filter_string,
                    return_fields: vec!["$".to_string()],
                }))
                .await?;
                docs.into_iter()
                    .map(|d| Self::materialize(&d.key, &key_prefix, d.score, d.payload, request.include_vectors))
                    .collect::<Result<Vec<_>>>()?
            }
            SearchMode::Hybrid => {
                let query_text = request
                    .query
                    .clone()
                    .ok_or_else(|| Error::InvalidSchema("hybrid search requires a query".to_string()))?;

                let idx_for_knn = idx.clone();
                let filter_for_knn = filter_string.clone();
                let knn_leg = crate::cancel::cancellable(async {
                    let embed = self.query_embedder.embed(&query_text).await?;
                    self.storage
                        .knn(KnnRequest {
                            index: idx_for_knn,
                            vector: embed.embedding,
                            k: top_k,
                            filters: filter_for_knn,
                            return_fields: vec!["$".to_string()],
                            raw_scores: false,
                        })
                        .await
                });
                let bm25_leg = crate::cancel::cancellable(self.storage.bm25(Bm25Request {
                    index: idx,
                    query: query_text,
                    top_k,
                    filters: filter_string,
                    return_fields: vec!["$".to_string()],
                }));
                let (knn_docs, bm25_docs) = tokio::try_join!(knn_leg, bm25_leg)?;

                reciprocal_rank_fusion(&knn_docs, &bm25_docs)
                    .into_iter()
                    .map(|f| Self::materialize(&f.key, &key_prefix, f.score as f32, f.payload, request.include_vectors))
                    .collect::<Result<Vec<_>>>()?
            }
            SearchMode::Geo => {
                let geo_query = request
                    .geo
                    .clone()
                    .ok_or_else(|| Error::GeoQueryInvalid("missing query object".to_string()))?;
                geo::validate_lat_lon(geo_query.latitude, geo_query.longitude)?;
                let vector = geo::to_ecef(geo_query.latitude, geo_query.longitude);

                // The KNN leg only narrows the candidate pool via the ECEF
                // approximation; the distance actually reported comes from
                // Haversine on the document's own stored lat/lon below, so
                // the backend's own similarity score is unused here.
                let docs = crate::cancel::cancellable(self.storage.knn(KnnRequest {
                    index: idx,
                    vector: vector.to_vec(),
                    k: top_k,
                    filters: filter_string,
                    return_fields: vec!["$".to_string()],
                    raw_scores: false,
                }))
                .await?;

                let mut out = Vec::with_capacity(docs.len());
                for d in docs {
                    let id = d.key.strip_prefix(&key_prefix).unwrap_or(&d.key).to_string();
                    let Some(body) = d.payload else { continue };
                    let doc = Document::from_json_body(&id, &body)?;
                    let (Some(lat), Some(lon)) = (
                        doc.numerics.get("latitude").copied(),
                        doc.numerics.get("longitude").copied(),
                    ) else {
                        continue;
                    };
                    let distance = geo::haversine_meters(geo_query.latitude, geo_query.longitude, lat, lon);
                    if distance > geo_query.radius_meters {
                        continue;
                    }
                    out.push(SearchHit {
                        id,
                        score: distance as f32,
                        content: doc.content,
                        tags: doc.tags,
                        numerics: doc.numerics,
                        vector: request.include_vectors.then_some(doc.vector),
                    });
                }
                out
            }
        };

        match mode {
            SearchMode::Geo => hits.sort_by(|a, b| {
                a.score
                    .partial_cmp(&b.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.id.cmp(&b.id))
            }),
            _ => {
                // §4.5 "MinScore. Applied post-fusion as score ≥ minScore."
                // Extended uniformly to every score-based mode; geo's score
                // is a distance where lower is better, so minScore has no
                // meaningful application there (the radius already bounds it).
                if let Some(min_score) = request.min_score {
                    hits.retain(|h| h.score >= min_score);
                }
                hits.sort_by(|a, b| {
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.id.cmp(&b.id))
                });
            }
        }

        hits.truncate(limit);
        Ok(hits)
    }
}
