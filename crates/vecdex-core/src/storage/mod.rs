//! `StorageAdapter`: a uniform facade over the two backend variants (§4.1).
//!
//! Everything above this module talks to `dyn StorageAdapter`, never to the
//! wire protocol directly. Engine-specific error strings ("index already
//! exists", "unknown index") are translated into stable [`crate::Error`]
//! sentinels at this boundary — callers classify by variant, never by
//! string match (§7).

pub mod filter;
pub mod redis_adapter;

pub use filter::{Filter, FilterCondition};
pub use redis_adapter::RedisAdapter;

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Which engine-native storage shape backs an index: a flat hash or a JSON
/// document. Vecdex always stores documents as JSON (§4.3), but the
/// adapter surface keeps both because the underlying engine exposes both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// Flat key/value hash.
    Hash,
    /// JSON document.
    Json,
}

/// HNSW or FLAT vector index algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorAlgo {
    /// Graph-based approximate nearest neighbor.
    Hnsw,
    /// Brute-force exact nearest neighbor.
    Flat,
}

/// Vector distance metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorMetric {
    /// Euclidean (L2) distance.
    L2,
    /// Inner product.
    Ip,
    /// Cosine distance.
    Cosine,
}

/// HNSW/FLAT vector field parameters.
#[derive(Debug, Clone)]
pub struct VectorFieldOptions {
    /// HNSW or FLAT.
    pub algo: VectorAlgo,
    /// Vector dimension.
    pub dim: usize,
    /// Distance metric.
    pub metric: VectorMetric,
    /// HNSW `M` (ignored for FLAT).
    pub m: usize,
    /// HNSW `EF_CONSTRUCTION` (ignored for FLAT).
    pub ef_construct: usize,
    /// Backend block size hint.
    pub block_size: usize,
}

/// An indexed field's engine-native type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFieldType {
    /// Numeric range field.
    Numeric,
    /// Tag (exact-match / set membership) field.
    Tag,
    /// Full-text field (BM25).
    Text,
    /// Vector field.
    Vector,
}

/// One field in an index's schema.
#[derive(Debug, Clone)]
pub struct IndexField {
    /// Document JSON key (or hash field name) this index field reads from.
    pub name: String,
    /// Optional alias exposed in filter/query syntax (e.g. `vector` for
    /// the reserved `__vector` JSON key).
    pub alias: Option<String>,
    /// Engine-native field type.
    pub field_type: IndexFieldType,
    /// Present iff `field_type == Vector`.
    pub vector: Option<VectorFieldOptions>,
}

/// A complete index schema, as passed to [`StorageAdapter::create_index`].
#[derive(Debug, Clone)]
pub struct IndexSchema {
    /// Index name.
    pub name: String,
    /// Hash or JSON backing storage.
    pub storage: StorageKind,
    /// Document-key prefix the index is built over.
    pub key_prefix: String,
    /// Ordered field list.
    pub fields: Vec<IndexField>,
}

/// A single scored/listed document as returned by the `Searcher` capability.
#[derive(Debug, Clone)]
pub struct ScoredDoc {
    /// The full storage key (`{prefix}{collection}:{id}`).
    pub key: String,
    /// Similarity score (KNN), BM25 relevance, or 0.0 for a plain list.
    pub score: f32,
    /// The document's JSON body, if requested via `return_fields`.
    pub payload: Option<Value>,
}

/// A dense-vector KNN request.
#[derive(Debug, Clone)]
pub struct KnnRequest {
    /// Index to search.
    pub index: String,
    /// Query vector.
    pub vector: Vec<f32>,
    /// Number of neighbors to retrieve.
    pub k: usize,
    /// Pre-compiled filter string (`*` for none).
    pub filters: String,
    /// Fields to return (use `["$"]` to fetch the whole JSON body).
    pub return_fields: Vec<String>,
    /// When true, preserve the engine's raw distance instead of converting
    /// it to a `1 - distance` similarity score (used for geo).
    pub raw_scores: bool,
}

/// A BM25 keyword request.
#[derive(Debug, Clone)]
pub struct Bm25Request {
    /// Index to search.
    pub index: String,
    /// Raw (unescaped) query text.
    pub query: String,
    /// Number of results to retrieve.
    pub top_k: usize,
    /// Pre-compiled filter string (`*` for none).
    pub filters: String,
    /// Fields to return (use `["$"]` to fetch the whole JSON body).
    pub return_fields: Vec<String>,
}

/// A paginated listing request.
#[derive(Debug, Clone)]
pub struct ListRequest {
    /// Index to list.
    pub index: String,
    /// Zero-based offset.
    pub offset: usize,
    /// Page size.
    pub limit: usize,
}

/// Uniform facade over the two backend variants (§4.1). One implementation,
/// [`RedisAdapter`], speaks both (standalone and cluster) by internally
/// selecting the connection variant; a test double implements the same
/// trait entirely in memory.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    // ---- HashStore ----

    /// `HSET key field value ...`.
    async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<()>;

    /// `HGETALL key`. Returns an empty map if the key does not exist.
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;

    /// `HGETALL` for many keys in a single pipelined round trip, preserving
    /// input order.
    async fn hgetall_multi(&self, keys: &[String]) -> Result<Vec<HashMap<String, String>>>;

    /// `SCAN` for keys under `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    // ---- JSONStore ----

    /// `JSON.SET key path value`.
    async fn json_set(&self, key: &str, path: &str, value: &Value) -> Result<()>;

    /// `JSON.SET $ <value>` for many keys in a single pipelined round trip
    /// (§4.6 batch geo upsert). All-or-nothing at the network level only in
    /// the sense of one round trip; per-key failures are not reported
    /// individually — the caller has already validated each item before
    /// calling this.
    async fn json_set_multi(&self, entries: &[(String, Value)]) -> Result<()>;

    /// `JSON.GET key path`. Returns `None` on the engine's dedicated
    /// not-found sentinel rather than an error.
    async fn json_get(&self, key: &str, path: &str) -> Result<Option<Value>>;

    // ---- KVStore ----

    /// `GET key`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// `SET key value`.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// `DEL key`.
    async fn del(&self, key: &str) -> Result<()>;

    /// `EXISTS key`.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// `INCRBY key by`.
    async fn incrby(&self, key: &str, by: i64) -> Result<i64>;

    /// `EXPIRE key ttl_secs NX` — sets the TTL only if the key has none.
    async fn expire_nx(&self, key: &str, ttl_secs: u64) -> Result<()>;

    // ---- IndexManager ----

    /// `FT.CREATE`. Translates "index already exists" into
    /// [`crate::Error::AlreadyExists`].
    async fn create_index(&self, schema: &IndexSchema) -> Result<()>;

    /// `FT.DROPINDEX`. Translates "unknown index" into
    /// [`crate::Error::NotFound`].
    async fn drop_index(&self, name: &str) -> Result<()>;

    /// Probes whether an index exists.
    async fn index_exists(&self, name: &str) -> Result<bool>;

    /// Whether this backend deployment supports BM25 text indexing.
    fn supports_bm25(&self) -> bool;

    // ---- Searcher ----

    /// Dense-vector KNN search.
    async fn knn(&self, req: KnnRequest) -> Result<Vec<ScoredDoc>>;

    /// BM25 keyword search. Returns
    /// [`crate::Error::KeywordSearchNotSupported`] if `!supports_bm25()`.
    async fn bm25(&self, req: Bm25Request) -> Result<Vec<ScoredDoc>>;

    /// Paginated listing in index order (by key).
    async fn list(&self, req: ListRequest) -> Result<Vec<ScoredDoc>>;

    /// Total document count for an index.
    async fn count(&self, index: &str) -> Result<usize>;
}

/// Encodes a `f32` vector as little-endian bytes, the wire format `$BLOB`
/// parameter for `KNN` queries (§4.1).
#[must_use]
pub fn vector_to_le_bytes(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decodes little-endian bytes back into a `f32` vector. Used by test
/// doubles and by the embedding cache's raw byte format.
#[must_use]
pub fn vector_from_le_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_bytes_roundtrip() {
        let v = vec![1.0_f32, -2.5, 0.0, 3.25];
        let bytes = vector_to_le_bytes(&v);
        assert_eq!(bytes.len(), 16);
        assert_eq!(vector_from_le_bytes(&bytes), v);
    }
}
