//! InstructionPrefix decorator: prepends a fixed instruction string before
//! delegating (§4.2). The outermost stage in the chain.

use super::{BatchEmbedResult, EmbedResult, EmbeddingPipeline};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Prepends `prefix` to every text before delegating to `inner`.
pub struct InstructionPrefix {
    inner: Arc<dyn EmbeddingPipeline>,
    prefix: String,
}

impl InstructionPrefix {
    /// Builds an instruction-prefix decorator around `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn EmbeddingPipeline>, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl EmbeddingPipeline for InstructionPrefix {
    async fn embed(&self, text: &str) -> Result<EmbedResult> {
        let prefixed = format!("{}{}", self.prefix, text);
        self.inner.embed(&prefixed).await
    }

    async fn batch_embed(&self, texts: &[String]) -> Result<BatchEmbedResult> {
        let prefixed: Vec<String> = texts.iter().map(|t| format!("{}{}", self.prefix, t)).collect();
        self.inner.batch_embed(&prefixed).await
    }
}
