//! Builds the two standing pipeline instances — document-embedder and
//! query-embedder — by composing the decorator chain (§4.2):
//!
//! `InstructionPrefix(Instrumented(BudgetGate(Cache(ProviderHttp))))`

use super::budget_gate::BudgetGate;
use super::cache::Cache;
use super::instruction::InstructionPrefix;
use super::instrumented::{metrics_cache_observer, Instrumented};
use super::provider::ProviderHttp;
use super::EmbeddingPipeline;
use crate::config::VecdexConfig;
use crate::metrics::Metrics;
use crate::storage::StorageAdapter;
use std::sync::Arc;

/// The two pipeline instances a deployment needs: one for document
/// (write-path) content, one for search queries. Each carries its own
/// instruction prefix but shares the same cache, budget counters and
/// metrics collector (§4.2 "two independent pipeline instances").
pub struct PipelineSet {
    /// Embeds document content at write time.
    pub document: Arc<dyn EmbeddingPipeline>,
    /// Embeds query text at search time.
    pub query: Arc<dyn EmbeddingPipeline>,
}

fn build_chain(
    config: &VecdexConfig,
    storage: Arc<dyn StorageAdapter>,
    metrics: Arc<Metrics>,
    instruction_prefix: &str,
) -> Arc<dyn EmbeddingPipeline> {
    let client = reqwest::Client::new();
    let provider: Arc<dyn EmbeddingPipeline> = Arc::new(ProviderHttp::new(
        client,
        config.embedding.base_url.clone(),
        config.embedding.api_key.clone(),
        config.embedding.model.clone(),
        config.embedding.dimensions,
    ));

    let cache = Cache::new(
        provider,
        storage.clone(),
        "openai",
        config.embedding.model.clone(),
        config.storage.key_prefix.clone(),
    )
    .with_observer(metrics_cache_observer(metrics.clone()));
    let cache: Arc<dyn EmbeddingPipeline> = Arc::new(cache);

    let budget_gate: Arc<dyn EmbeddingPipeline> = Arc::new(BudgetGate::new(
        cache,
        storage,
        "openai",
        config.storage.key_prefix.clone(),
        config.budget.daily_limit,
        config.budget.monthly_limit,
        config.budget.action,
    ));

    let instrumented: Arc<dyn EmbeddingPipeline> =
        Arc::new(Instrumented::new(budget_gate, metrics));

    Arc::new(InstructionPrefix::new(instrumented, instruction_prefix.to_string()))
}

/// Builds the document-embedder pipeline (write path).
#[must_use]
pub fn build_document_pipeline(
    config: &VecdexConfig,
    storage: Arc<dyn StorageAdapter>,
    metrics: Arc<Metrics>,
) -> Arc<dyn EmbeddingPipeline> {
    build_chain(config, storage, metrics, &config.embedding.instruction.document)
}

/// Builds the query-embedder pipeline (search path).
#[must_use]
pub fn build_query_pipeline(
    config: &VecdexConfig,
    storage: Arc<dyn StorageAdapter>,
    metrics: Arc<Metrics>,
) -> Arc<dyn EmbeddingPipeline> {
    build_chain(config, storage, metrics, &config.embedding.instruction.query)
}

/// Builds both standing pipeline instances for a deployment.
#[must_use]
pub fn build_pipelines(config: &VecdexConfig, storage: Arc<dyn StorageAdapter>, metrics: Arc<Metrics>) -> PipelineSet {
    PipelineSet {
        document: build_document_pipeline(config, storage.clone(), metrics.clone()),
        query: build_query_pipeline(config, storage, metrics),
    }
}
