//! `EmbeddingPipeline`: a decorator chain around a remote embedding
//! provider (§4.2).
//!
//! `InstructionPrefix(Instrumented(BudgetGate(Cache(ProviderHttp))))`. Each
//! decorator implements the same [`EmbeddingPipeline`] trait and holds the
//! next stage as a plain owned `Arc`; there is no back-reference from an
//! inner stage to an outer one. Cache events reach `Instrumented` through a
//! thin callback rather than a reverse pointer.

pub mod budget_gate;
pub mod cache;
pub mod instruction;
pub mod instrumented;
pub mod pipeline;
pub mod provider;

pub use pipeline::{build_document_pipeline, build_pipelines, build_query_pipeline, PipelineSet};

use crate::error::Result;
use async_trait::async_trait;

/// Result of embedding a single text.
#[derive(Debug, Clone, Default)]
pub struct EmbedResult {
    /// The resulting dense vector.
    pub embedding: Vec<f32>,
    /// Prompt tokens billed by the provider (0 on a cache hit).
    pub prompt_tokens: u64,
    /// Total tokens billed by the provider (0 on a cache hit).
    pub total_tokens: u64,
}

/// Result of embedding a batch of texts, in input order.
#[derive(Debug, Clone, Default)]
pub struct BatchEmbedResult {
    /// One vector per input text, same order as the request.
    pub embeddings: Vec<Vec<f32>>,
    /// Prompt tokens billed across the batch's cache misses.
    pub prompt_tokens: u64,
    /// Total tokens billed across the batch's cache misses.
    pub total_tokens: u64,
}

/// The capability set shared by every decorator and the terminal HTTP
/// provider.
#[async_trait]
pub trait EmbeddingPipeline: Send + Sync {
    /// Embeds a single text.
    async fn embed(&self, text: &str) -> Result<EmbedResult>;

    /// Embeds a batch of texts, preserving input order.
    async fn batch_embed(&self, texts: &[String]) -> Result<BatchEmbedResult>;
}
