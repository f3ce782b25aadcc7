//! # Vecdex Core
//!
//! Vector index management over a Redis-Stack-compatible backend.
//!
//! Vecdex organizes documents into named collections, each either
//! semantically searchable (dense-vector KNN over an embedded text field)
//! or geographically searchable (KNN over an ECEF-encoded lat/lon). Search
//! supports semantic, keyword (BM25), hybrid (RRF-fused), and geo-proximity
//! modes against whichever backend deployment is configured.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use vecdex_core::{VecdexConfig, VecdexService};
//!
//! let config = VecdexConfig::load()?;
//! let service = VecdexService::connect(config).await?;
//!
//! service.collections.create("notes", CollectionType::Text, vec![], 1536, now_ms()).await?;
//! service.documents.upsert("notes", "a", "hello world", Default::default(), Default::default()).await?;
//! let hits = service.search.search("notes", SearchRequest::default()).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod batch;
pub mod cancel;
pub mod collection;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod geo;
pub mod metrics;
pub mod model;
pub mod search;
pub mod storage;
pub mod usage;

pub use batch::{BatchItemResult, BatchReport, BatchService, BatchStatus, BatchUpsertItem};
pub use cancel::{scoped, CancellationToken};
pub use collection::CollectionManager;
pub use config::VecdexConfig;
pub use document::{DocumentManager, DocumentPatch, PatchOutcome, UpsertOutcome};
pub use error::{Error, Result};
pub use metrics::Metrics;
pub use model::{Collection, CollectionType, Field, FieldType};
pub use search::{GeoQuery, SearchHit, SearchMode, SearchPlanner, SearchRequest};
pub use storage::{Filter, FilterCondition, RedisAdapter, StorageAdapter};
pub use usage::UsageReporter;

use embedding::budget_gate::BudgetGate;
use std::sync::Arc;

/// The fully wired set of components a deployment needs: one
/// [`StorageAdapter`] and the managers/services built on top of it (§4).
///
/// This is the composition root. The HTTP edge depends on this, never on
/// the individual managers' constructors, so that wiring stays in one
/// place.
pub struct VecdexService {
    /// Creates/reads/deletes collections and compiles their backend index
    /// schemas.
    pub collections: Arc<CollectionManager>,
    /// Upserts/patches/lists/fetches/deletes documents.
    pub documents: Arc<DocumentManager>,
    /// Dispatches search requests across modes and fuses hybrid results.
    pub search: Arc<SearchPlanner>,
    /// Batch upsert/delete with per-item results and quota cascade.
    pub batch: Arc<BatchService>,
    /// Period usage reports over the shared budget state.
    pub usage: Arc<UsageReporter>,
    /// Process metric collectors, exposed for the `/metrics` HTTP route.
    pub metrics: Arc<Metrics>,
    /// The underlying storage adapter, exposed for health checks.
    pub storage: Arc<dyn StorageAdapter>,
}

impl VecdexService {
    /// Connects to the configured backend and wires every manager/service
    /// on top of it (§4 "component inventory").
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if the initial storage connection fails.
    pub async fn connect(config: VecdexConfig) -> Result<Self> {
        let adapter = RedisAdapter::connect(&config.storage).await?;
        let storage: Arc<dyn StorageAdapter> = Arc::new(adapter);
        Self::build(config, storage)
    }

    /// Wires every manager/service over an already-connected `storage`.
    /// Exposed separately from [`Self::connect`] so tests can supply an
    /// in-memory [`StorageAdapter`] double.
    ///
    /// # Errors
    ///
    /// Infallible today; returns `Result` for forward compatibility with a
    /// startup-time schema/connectivity check.
    pub fn build(config: VecdexConfig, storage: Arc<dyn StorageAdapter>) -> Result<Self> {
        let metrics = Arc::new(Metrics::default());
        let pipelines = embedding::build_pipelines(&config, storage.clone(), metrics.clone());

        let collections = Arc::new(CollectionManager::new(storage.clone(), &config));
        let documents = Arc::new(DocumentManager::new(
            storage.clone(),
            collections.clone(),
            pipelines.document,
            config.storage.key_prefix.clone(),
        ));
        let search = Arc::new(SearchPlanner::new(
            storage.clone(),
            collections.clone(),
            pipelines.query,
            config.storage.key_prefix.clone(),
        ));
        let batch = Arc::new(BatchService::new(
            storage.clone(),
            collections.clone(),
            documents.clone(),
            &config,
        ));

        let budget_gate = Arc::new(BudgetGate::new(
            // UsageReporter only ever calls `snapshot`, so the inner stage
            // and provider id just need to match the pipeline's own gate
            // closely enough to read the same counters.
            Arc::new(embedding::provider::ProviderHttp::new(
                reqwest::Client::new(),
                config.embedding.base_url.clone(),
                config.embedding.api_key.clone(),
                config.embedding.model.clone(),
                config.embedding.dimensions,
            )),
            storage.clone(),
            "openai",
            config.storage.key_prefix.clone(),
            config.budget.daily_limit,
            config.budget.monthly_limit,
            config.budget.action,
        ));
        let usage = Arc::new(UsageReporter::new(budget_gate, metrics.clone()));

        Ok(Self {
            collections,
            documents,
            search,
            batch,
            usage,
            metrics,
            storage,
        })
    }
}
