//! Error types for Vecdex.
//!
//! A single enum carries every sentinel a lower layer can raise. Callers
//! classify errors by variant (or by [`Error::code`]), never by matching on
//! a backend's error string — translation into these sentinels happens once,
//! at the `StorageAdapter`/`EmbeddingPipeline` boundary.

use thiserror::Error;

/// Result type alias for Vecdex operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur across the Vecdex service.
#[derive(Error, Debug)]
pub enum Error {
    /// Collection does not exist.
    #[error("collection '{0}' not found")]
    NotFound(String),

    /// Document does not exist within an existing collection.
    #[error("document '{0}' not found in collection '{1}'")]
    DocumentNotFound(String, String),

    /// Collection creation collided with an existing collection.
    #[error("collection '{0}' already exists")]
    AlreadyExists(String),

    /// Malformed name/field/type/size, unknown field, wrong field type,
    /// oversized batch, or malformed cursor.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// Embedding vector length does not match the collection's declared
    /// dimension.
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    VectorDimMismatch {
        /// Declared collection dimension.
        expected: usize,
        /// Length of the vector actually produced.
        actual: usize,
    },

    /// An `ETag`/revision precondition was violated.
    #[error("revision conflict: current revision is {current}")]
    RevisionConflict {
        /// The document's current revision.
        current: u64,
    },

    /// The embedding provider responded with HTTP 429.
    #[error("embedding provider rate limited: {0}")]
    RateLimited(String),

    /// The local budget gate rejected the call (action = reject, limit
    /// already exceeded for the active period).
    #[error("embedding budget exceeded for provider '{0}'")]
    EmbeddingQuotaExceeded(String),

    /// Any other upstream embedding provider failure.
    #[error("embedding provider error: {0}")]
    EmbeddingProviderError(String),

    /// Keyword search was requested but the backend lacks BM25/text
    /// indexing support.
    #[error("keyword search not supported by this backend")]
    KeywordSearchNotSupported,

    /// Bad lat/lon, missing geo coordinates on a geo collection, or a
    /// missing geo query object.
    #[error("invalid geo query: {0}")]
    GeoQueryInvalid(String),

    /// Reserved for a future surface; not used by any current operation.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Caller's context was cancelled or its deadline elapsed.
    #[error("operation cancelled")]
    Cancelled,

    /// Everything else. Never surfaced verbatim to HTTP clients; logged in
    /// full and mapped to a generic message at the edge.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the stable `code` string used in HTTP error bodies and log
    /// classification. Never derived from a Display string.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "collection_not_found",
            Self::DocumentNotFound(..) => "document_not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::InvalidSchema(_) => "invalid_schema",
            Self::VectorDimMismatch { .. } => "vector_dim_mismatch",
            Self::RevisionConflict { .. } => "revision_conflict",
            Self::RateLimited(_) => "rate_limited",
            Self::EmbeddingQuotaExceeded(_) => "embedding_quota_exceeded",
            Self::EmbeddingProviderError(_) => "embedding_provider_error",
            Self::KeywordSearchNotSupported => "keyword_search_not_supported",
            Self::GeoQueryInvalid(_) => "geo_query_invalid",
            Self::NotImplemented(_) => "not_implemented",
            Self::Cancelled => "cancelled",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Returns true when this error cascades through the remainder of a
    /// batch (§4.6): subsequent items are failed without being attempted.
    #[must_use]
    pub const fn cascades_batch(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingQuotaExceeded(_) | Self::RateLimited(_) | Self::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_stable_string_not_display() {
        let err = Error::NotFound("notes".to_string());
        assert_eq!(err.code(), "collection_not_found");
        assert!(err.to_string().contains("notes"));
    }

    #[test]
    fn cascading_errors_are_quota_rate_limit_and_cancellation() {
        assert!(Error::EmbeddingQuotaExceeded("openai".into()).cascades_batch());
        assert!(Error::RateLimited("429".into()).cascades_batch());
        assert!(Error::Cancelled.cascades_batch());
        assert!(!Error::InvalidSchema("bad".into()).cascades_batch());
        assert!(!Error::EmbeddingProviderError("502".into()).cascades_batch());
    }
}
