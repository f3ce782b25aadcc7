//! Request/response types for the Vecdex REST API.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;
use vecdex_core::model::{Field, FieldType};
use vecdex_core::{
    BatchItemResult, BatchReport, BatchStatus, Collection, CollectionType, Filter, FilterCondition,
    GeoQuery, SearchHit,
};

fn default_page_size() -> usize {
    20
}

// ============================================================================
// Error
// ============================================================================

/// A stable-shaped error body, used for every non-2xx response (§7).
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Stable error code (see [`vecdex_core::Error::code`]).
    pub code: String,
    /// Human-readable detail. Never the raw internal error for
    /// `internal_error`.
    pub message: String,
}

// ============================================================================
// Collections
// ============================================================================

/// A user-declared field in a create-collection request.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct FieldDto {
    /// Field name.
    pub name: String,
    /// `tag` or `numeric`.
    #[serde(rename = "type")]
    pub field_type: String,
}

impl FieldDto {
    pub(crate) fn into_field(self) -> Result<Field, String> {
        let field_type = match self.field_type.as_str() {
            "tag" => FieldType::Tag,
            "numeric" => FieldType::Numeric,
            other => return Err(format!("unknown field type '{other}'")),
        };
        Ok(Field {
            name: self.name,
            field_type,
        })
    }
}

/// `POST /collections` request body.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCollectionRequest {
    /// Collection name.
    pub name: String,
    /// `text` or `geo`.
    #[serde(rename = "type")]
    pub collection_type: String,
    /// Declared user fields.
    #[serde(default)]
    pub fields: Vec<FieldDto>,
    /// Vector dimension, required for `text`, ignored for `geo`.
    #[serde(default, rename = "vectorDim")]
    pub vector_dim: Option<usize>,
}

/// A collection as returned by the API.
#[derive(Debug, Serialize, ToSchema)]
pub struct CollectionResponse {
    /// Collection name.
    pub name: String,
    /// `text` or `geo`.
    #[serde(rename = "type")]
    pub collection_type: String,
    /// Declared user fields.
    pub fields: Vec<FieldDto>,
    /// Vector dimension.
    #[serde(rename = "vectorDim")]
    pub vector_dim: usize,
    /// Creation timestamp, milliseconds since epoch.
    #[serde(rename = "createdAt")]
    pub created_at: i64,
    /// Monotonic collection revision.
    pub revision: u64,
}

impl From<Collection> for CollectionResponse {
    fn from(c: Collection) -> Self {
        Self {
            name: c.name,
            collection_type: match c.collection_type {
                CollectionType::Text => "text".to_string(),
                CollectionType::Geo => "geo".to_string(),
            },
            fields: c
                .fields
                .into_iter()
                .map(|f| FieldDto {
                    name: f.name,
                    field_type: f.field_type.as_str().to_string(),
                })
                .collect(),
            vector_dim: c.vector_dim,
            created_at: c.created_at,
            revision: c.revision,
        }
    }
}

/// `GET /collections` response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ListCollectionsResponse {
    /// Collections in creation order.
    pub items: Vec<CollectionResponse>,
}

// ============================================================================
// Documents
// ============================================================================

/// `PUT /collections/{c}/documents/{id}` request body.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpsertDocumentRequest {
    /// Free text content.
    pub content: String,
    /// Tag attribute values.
    #[serde(default)]
    pub tags: HashMap<String, String>,
    /// Numeric attribute values.
    #[serde(default)]
    pub numerics: HashMap<String, f64>,
}

/// `PATCH /collections/{c}/documents/{id}` request body. A field absent
/// from the JSON body is left untouched; `tags`/`numerics` entries mapped
/// to JSON `null` delete that key.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct PatchDocumentRequest {
    /// New content, if replacing it.
    pub content: Option<String>,
    /// Tag edits: `null` deletes, any other value sets.
    #[serde(default)]
    pub tags: HashMap<String, Option<String>>,
    /// Numeric edits: `null` deletes, any other value sets.
    #[serde(default)]
    pub numerics: HashMap<String, Option<f64>>,
}

/// A document as returned by the API.
#[derive(Debug, Serialize, ToSchema)]
pub struct DocumentResponse {
    /// Document id.
    pub id: String,
    /// Free text content.
    pub content: String,
    /// Tag attribute values.
    pub tags: HashMap<String, String>,
    /// Numeric attribute values.
    pub numerics: HashMap<String, f64>,
    /// Monotonic revision.
    pub revision: u64,
}

impl From<vecdex_core::model::Document> for DocumentResponse {
    fn from(d: vecdex_core::model::Document) -> Self {
        Self {
            id: d.id,
            content: d.content,
            tags: d.tags,
            numerics: d.numerics,
            revision: d.revision,
        }
    }
}

/// `GET /collections/{c}/documents` query parameters.
#[derive(Debug, Deserialize)]
pub struct ListDocumentsQuery {
    /// Opaque pagination cursor from a previous page's `next_cursor`.
    pub cursor: Option<String>,
    /// Page size, capped at the server's configured maximum.
    #[serde(default = "default_page_size")]
    pub limit: usize,
}

/// `GET /collections/{c}/documents` response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ListDocumentsResponse {
    /// Documents on this page.
    pub items: Vec<DocumentResponse>,
    /// Cursor for the next page, if there is one.
    pub next_cursor: Option<String>,
    /// Whether another page follows.
    pub has_more: bool,
}

// ============================================================================
// Search
// ============================================================================

/// A geo-proximity clause, lifted out of `filters.must` by this edge and
/// passed to the planner as a first-class field (§4.5).
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GeoQueryDto {
    /// Query latitude, degrees.
    pub latitude: f64,
    /// Query longitude, degrees.
    pub longitude: f64,
    /// Search radius, meters.
    #[serde(rename = "radiusMeters")]
    pub radius_meters: f64,
}

/// A single filter condition in the wire JSON.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FilterConditionDto {
    /// Exact-match tag condition.
    Tag {
        /// Declared field name.
        field: String,
        /// Value to match.
        value: String,
    },
    /// Set-membership tag condition.
    TagIn {
        /// Declared field name.
        field: String,
        /// Candidate values.
        values: Vec<String>,
    },
    /// Numeric range condition.
    Range {
        /// Declared field name.
        field: String,
        /// Exclusive lower bound.
        gt: Option<f64>,
        /// Inclusive lower bound.
        gte: Option<f64>,
        /// Exclusive upper bound.
        lt: Option<f64>,
        /// Inclusive upper bound.
        lte: Option<f64>,
    },
}

/// The `filters` object in a search request.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct FilterDto {
    /// Conditions that must all match.
    #[serde(default)]
    pub must: Vec<FilterConditionDto>,
    /// Conditions where at least one must match.
    #[serde(default)]
    pub should: Vec<FilterConditionDto>,
    /// Conditions that must not match.
    #[serde(default)]
    pub must_not: Vec<FilterConditionDto>,
}

impl FilterConditionDto {
    fn into_condition(self) -> FilterCondition {
        match self {
            Self::Tag { field, value } => FilterCondition::Tag { name: field, value },
            Self::TagIn { field, values } => FilterCondition::TagIn { name: field, values },
            Self::Range {
                field,
                gt,
                gte,
                lt,
                lte,
            } => FilterCondition::NumericRange {
                name: field,
                gt,
                gte,
                lt,
                lte,
            },
        }
    }
}

impl FilterDto {
    pub(crate) fn into_filter(self) -> Filter {
        Filter {
            must: self.must.into_iter().map(FilterConditionDto::into_condition).collect(),
            should: self.should.into_iter().map(FilterConditionDto::into_condition).collect(),
            must_not: self
                .must_not
                .into_iter()
                .map(FilterConditionDto::into_condition)
                .collect(),
        }
    }
}

impl GeoQueryDto {
    pub(crate) fn into_geo_query(self) -> GeoQuery {
        GeoQuery {
            latitude: self.latitude,
            longitude: self.longitude,
            radius_meters: self.radius_meters,
        }
    }
}

/// `POST /collections/{c}/documents/search` request body.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SearchRequestBody {
    /// Query text, for `semantic`/`keyword`/`hybrid` modes.
    pub query: Option<String>,
    /// `semantic`, `keyword`, `hybrid`, or `geo`. Defaults per collection
    /// type.
    pub mode: Option<String>,
    /// Tag/numeric filters.
    #[serde(default)]
    pub filters: FilterDto,
    /// Geo-proximity clause, required for `geo` mode.
    pub geo: Option<GeoQueryDto>,
    /// Candidate pool size before fusion/filtering.
    #[serde(rename = "topK")]
    pub top_k: Option<usize>,
    /// Result count after sorting/truncation.
    pub limit: Option<usize>,
    /// Minimum score (ignored in `geo` mode).
    #[serde(rename = "minScore")]
    pub min_score: Option<f32>,
    /// Include the raw stored vector on each hit.
    #[serde(default, rename = "includeVectors")]
    pub include_vectors: bool,
}

/// A single search hit.
#[derive(Debug, Serialize, ToSchema)]
pub struct SearchHitResponse {
    /// Document id.
    pub id: String,
    /// Similarity score, BM25 score, fused RRF score, or distance in
    /// meters for `geo` mode.
    pub score: f32,
    /// Document content.
    pub content: String,
    /// Tag attribute values.
    pub tags: HashMap<String, String>,
    /// Numeric attribute values.
    pub numerics: HashMap<String, f64>,
    /// The stored vector, present iff `includeVectors` was set.
    pub vector: Option<Vec<f32>>,
}

impl From<SearchHit> for SearchHitResponse {
    fn from(h: SearchHit) -> Self {
        Self {
            id: h.id,
            score: h.score,
            content: h.content,
            tags: h.tags,
            numerics: h.numerics,
            vector: h.vector,
        }
    }
}

/// `POST /collections/{c}/documents/search` response.
#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResponse {
    /// Matching documents, ordered per the resolved mode's ranking.
    pub items: Vec<SearchHitResponse>,
}

// ============================================================================
// Batch
// ============================================================================

/// One document in a `batch-upsert` request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct BatchUpsertDocumentDto {
    /// Document id.
    pub id: String,
    /// Free text content.
    pub content: String,
    /// Tag attribute values.
    #[serde(default)]
    pub tags: HashMap<String, String>,
    /// Numeric attribute values.
    #[serde(default)]
    pub numerics: HashMap<String, f64>,
}

/// `POST /collections/{c}/documents/batch-upsert` request body.
#[derive(Debug, Deserialize, ToSchema)]
pub struct BatchUpsertRequest {
    /// Documents to upsert, at most the server's configured
    /// `maxBatchSize`.
    pub documents: Vec<BatchUpsertDocumentDto>,
}

/// `POST /collections/{c}/documents/batch-delete` request body.
#[derive(Debug, Deserialize, ToSchema)]
pub struct BatchDeleteRequest {
    /// Document ids to delete, at most the server's configured
    /// `maxBatchSize`.
    pub ids: Vec<String>,
}

/// One item's outcome in a batch response.
#[derive(Debug, Serialize, ToSchema)]
pub struct BatchItemResponse {
    /// The item's id.
    pub id: String,
    /// `ok` or `error`.
    pub status: String,
    /// Stable error code, present iff `status == "error"`.
    pub error_code: Option<String>,
    /// Human-readable error detail, present iff `status == "error"`.
    pub error_message: Option<String>,
}

impl From<BatchItemResult> for BatchItemResponse {
    fn from(r: BatchItemResult) -> Self {
        Self {
            id: r.id,
            status: match r.status {
                BatchStatus::Ok => "ok".to_string(),
                BatchStatus::Error => "error".to_string(),
            },
            error_code: r.error_code.map(str::to_string),
            error_message: r.error_message,
        }
    }
}

/// Batch call response: `{items, succeeded, failed}` (§4.6, §6).
#[derive(Debug, Serialize, ToSchema)]
pub struct BatchResponse {
    /// Per-item outcomes, in input order.
    pub items: Vec<BatchItemResponse>,
    /// Count of successful items.
    pub succeeded: usize,
    /// Count of failed items.
    pub failed: usize,
}

impl From<BatchReport> for BatchResponse {
    fn from(r: BatchReport) -> Self {
        Self {
            items: r.items.into_iter().map(Into::into).collect(),
            succeeded: r.succeeded,
            failed: r.failed,
        }
    }
}

// ============================================================================
// Usage
// ============================================================================

/// `GET /usage` query parameters.
#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    /// `day`, `month`, or `total`. Defaults to `day`.
    pub period: Option<String>,
}

/// `GET /usage` response.
#[derive(Debug, Serialize, ToSchema)]
pub struct UsageResponse {
    /// The reporting period this report covers.
    pub period: String,
    /// Period start, milliseconds since epoch (0 for `total`).
    pub start_ms: i64,
    /// Period end, milliseconds since epoch, exclusive (0 for `total`).
    pub end_ms: i64,
    /// Number of embedding requests observed.
    pub requests: u64,
    /// Total tokens billed.
    pub tokens: u64,
    /// Whether a configured limit has been met or exceeded.
    pub is_exhausted: bool,
}

impl From<vecdex_core::model::UsageReport> for UsageResponse {
    fn from(r: vecdex_core::model::UsageReport) -> Self {
        use vecdex_core::model::Period;
        Self {
            period: match r.period {
                Period::Day => "day".to_string(),
                Period::Month => "month".to_string(),
                Period::Total => "total".to_string(),
            },
            start_ms: r.start_ms,
            end_ms: r.end_ms,
            requests: r.metrics.requests,
            tokens: r.metrics.tokens,
            is_exhausted: r.budget.is_exhausted(),
        }
    }
}

// ============================================================================
// Health
// ============================================================================

/// `GET /health` response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `"ok"` or `"unavailable"`.
    pub status: String,
}
