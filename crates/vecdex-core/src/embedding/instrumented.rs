//! Instrumented decorator: records request count, latency, token count and
//! per-code errors against a shared [`Metrics`] collector (§4.2).

use super::cache::{CacheEvent, CacheObserver};
use super::{BatchEmbedResult, EmbedResult, EmbeddingPipeline};
use crate::error::Result;
use crate::metrics::Metrics;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Wraps an inner pipeline stage, recording metrics around every call.
pub struct Instrumented {
    inner: Arc<dyn EmbeddingPipeline>,
    metrics: Arc<Metrics>,
}

impl Instrumented {
    /// Builds an instrumented decorator around `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn EmbeddingPipeline>, metrics: Arc<Metrics>) -> Self {
        Self { inner, metrics }
    }

    /// Returns a [`CacheObserver`] that feeds cache hit/miss events into
    /// this decorator's metrics collector. The `Cache` layer calls this
    /// callback; it never holds a reference back to `Instrumented` (§9).
    #[must_use]
    pub fn cache_observer(&self) -> Arc<dyn CacheObserver> {
        metrics_cache_observer(self.metrics.clone())
    }
}

/// Builds a [`CacheObserver`] that records hit/miss events against
/// `metrics`, without requiring a constructed [`Instrumented`] instance.
#[must_use]
pub fn metrics_cache_observer(metrics: Arc<Metrics>) -> Arc<dyn CacheObserver> {
    Arc::new(MetricsCacheObserver { metrics })
}

struct MetricsCacheObserver {
    metrics: Arc<Metrics>,
}

impl CacheObserver for MetricsCacheObserver {
    fn observe(&self, event: CacheEvent) {
        self.metrics.record_cache_event(event);
    }
}

#[async_trait]
impl EmbeddingPipeline for Instrumented {
    async fn embed(&self, text: &str) -> Result<EmbedResult> {
        let start = Instant::now();
        let result = self.inner.embed(text).await;
        let latency_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(r) => self.metrics.record_embedding_request(latency_ms, r.total_tokens),
            Err(e) => {
                self.metrics.record_embedding_request(latency_ms, 0);
                self.metrics.record_embedding_error(e.code());
            }
        }
        result
    }

    async fn batch_embed(&self, texts: &[String]) -> Result<BatchEmbedResult> {
        let start = Instant::now();
        let result = self.inner.batch_embed(texts).await;
        let latency_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(r) => self.metrics.record_embedding_request(latency_ms, r.total_tokens),
            Err(e) => {
                self.metrics.record_embedding_request(latency_ms, 0);
                self.metrics.record_embedding_error(e.code());
            }
        }
        result
    }
}
