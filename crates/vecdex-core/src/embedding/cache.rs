//! Cache decorator: content-addressed embedding cache backed by the storage
//! adapter's plain KV capability (§4.2).

use super::{BatchEmbedResult, EmbedResult, EmbeddingPipeline};
use crate::error::Result;
use crate::storage::{vector_from_le_bytes, vector_to_le_bytes, StorageAdapter};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Observed by [`super::instrumented::Instrumented`] via [`CacheObserver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    /// The key was found and the stored vector was reused.
    Hit,
    /// The key was absent (or unreadable); the inner stage was invoked.
    Miss,
}

/// A callback the cache publishes hit/miss events through. Kept as a plain
/// trait object rather than a back-reference to the outer decorator.
pub trait CacheObserver: Send + Sync {
    /// Called once per text processed by [`Cache`].
    fn observe(&self, event: CacheEvent);
}

impl<F: Fn(CacheEvent) + Send + Sync> CacheObserver for F {
    fn observe(&self, event: CacheEvent) {
        self(event);
    }
}

struct NoopObserver;
impl CacheObserver for NoopObserver {
    fn observe(&self, _event: CacheEvent) {}
}

/// Wraps an inner pipeline stage with a content-addressed cache: key =
/// `hex(sha256(provider || model || input))`, value = little-endian float32
/// bytes, hex-encoded for the adapter's string-valued KV surface.
pub struct Cache {
    inner: Arc<dyn EmbeddingPipeline>,
    storage: Arc<dyn StorageAdapter>,
    provider: String,
    model: String,
    key_prefix: String,
    observer: Arc<dyn CacheObserver>,
}

impl Cache {
    /// Builds a cache decorator around `inner`.
    #[must_use]
    pub fn new(
        inner: Arc<dyn EmbeddingPipeline>,
        storage: Arc<dyn StorageAdapter>,
        provider: impl Into<String>,
        model: impl Into<String>,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            inner,
            storage,
            provider: provider.into(),
            model: model.into(),
            key_prefix: key_prefix.into(),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Attaches an observer that is notified of every hit/miss.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn CacheObserver>) -> Self {
        self.observer = observer;
        self
    }

    fn cache_key(&self, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.provider.as_bytes());
        hasher.update(self.model.as_bytes());
        hasher.update(text.as_bytes());
        format!("{}emb_cache:{}", self.key_prefix, hex::encode(hasher.finalize()))
    }

    /// Reads the cache. A storage read error is non-fatal and reported as a
    /// miss, per §4.2.
    async fn read(&self, key: &str) -> Option<Vec<f32>> {
        let raw = self.storage.get(key).await.ok().flatten()?;
        let bytes = hex::decode(raw).ok()?;
        Some(vector_from_le_bytes(&bytes))
    }

    /// Writes the cache. A write failure is logged but never surfaced —
    /// the caller already has the vector it needs.
    async fn write(&self, key: &str, vector: &[f32]) {
        let encoded = hex::encode(vector_to_le_bytes(vector));
        if let Err(e) = self.storage.set(key, &encoded).await {
            tracing::warn!(error = %e, "embedding cache write failed");
        }
    }
}

#[async_trait]
impl EmbeddingPipeline for Cache {
    async fn embed(&self, text: &str) -> Result<EmbedResult> {
        let key = self.cache_key(text);
        if let Some(embedding) = self.read(&key).await {
            self.observer.observe(CacheEvent::Hit);
            return Ok(EmbedResult {
                embedding,
                prompt_tokens: 0,
                total_tokens: 0,
            });
        }
        self.observer.observe(CacheEvent::Miss);
        let result = self.inner.embed(text).await?;
        self.write(&key, &result.embedding).await;
        Ok(result)
    }

    async fn batch_embed(&self, texts: &[String]) -> Result<BatchEmbedResult> {
        let mut embeddings = vec![Vec::new(); texts.len()];
        let mut miss_indices = Vec::new();
        let mut miss_texts = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            let key = self.cache_key(text);
            if let Some(embedding) = self.read(&key).await {
                self.observer.observe(CacheEvent::Hit);
                embeddings[i] = embedding;
            } else {
                self.observer.observe(CacheEvent::Miss);
                miss_indices.push(i);
                miss_texts.push(text.clone());
            }
        }

        if miss_texts.is_empty() {
            return Ok(BatchEmbedResult {
                embeddings,
                prompt_tokens: 0,
                total_tokens: 0,
            });
        }

        let result = self.inner.batch_embed(&miss_texts).await?;
        for (j, idx) in miss_indices.iter().enumerate() {
            if let Some(vector) = result.embeddings.get(j) {
                embeddings[*idx] = vector.clone();
                let key = self.cache_key(&texts[*idx]);
                self.write(&key, vector).await;
            }
        }

        Ok(BatchEmbedResult {
            embeddings,
            prompt_tokens: result.prompt_tokens,
            total_tokens: result.total_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct CountingProvider {
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl EmbeddingPipeline for CountingProvider {
        async fn embed(&self, _text: &str) -> Result<EmbedResult> {
            *self.calls.lock().unwrap() += 1;
            Ok(EmbedResult {
                embedding: vec![1.0, 0.0, 0.0],
                prompt_tokens: 3,
                total_tokens: 3,
            })
        }

        async fn batch_embed(&self, texts: &[String]) -> Result<BatchEmbedResult> {
            *self.calls.lock().unwrap() += 1;
            Ok(BatchEmbedResult {
                embeddings: texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect(),
                prompt_tokens: 3 * texts.len() as u64,
                total_tokens: 3 * texts.len() as u64,
            })
        }
    }

    struct InMemoryKv {
        map: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl StorageAdapter for InMemoryKv {
        async fn hset(&self, _key: &str, _fields: &[(String, String)]) -> Result<()> {
            unimplemented!()
        }
        async fn hgetall(&self, _key: &str) -> Result<HashMap<String, String>> {
            unimplemented!()
        }
        async fn hgetall_multi(&self, _keys: &[String]) -> Result<Vec<HashMap<String, String>>> {
            unimplemented!()
        }
        async fn scan_prefix(&self, _prefix: &str) -> Result<Vec<String>> {
            unimplemented!()
        }
        async fn json_set(&self, _key: &str, _path: &str, _value: &serde_json::Value) -> Result<()> {
            unimplemented!()
        }
        async fn json_get(&self, _key: &str, _path: &str) -> Result<Option<serde_json::Value>> {
            unimplemented!()
        }
        async fn get(&self, key: &str) -> Result<Option<String>> {
            Ok(self.map.lock().unwrap().get(key).cloned())
        }
        async fn set(&self, key: &str, value: &str) -> Result<()> {
            self.map
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }
        async fn del(&self, _key: &str) -> Result<()> {
            unimplemented!()
        }
        async fn exists(&self, _key: &str) -> Result<bool> {
            unimplemented!()
        }
        async fn incrby(&self, _key: &str, _by: i64) -> Result<i64> {
            unimplemented!()
        }
        async fn expire_nx(&self, _key: &str, _ttl_secs: u64) -> Result<()> {
            unimplemented!()
        }
        async fn create_index(&self, _schema: &crate::storage::IndexSchema) -> Result<()> {
            unimplemented!()
        }
        async fn drop_index(&self, _name: &str) -> Result<()> {
            unimplemented!()
        }
        async fn index_exists(&self, _name: &str) -> Result<bool> {
            unimplemented!()
        }
        fn supports_bm25(&self) -> bool {
            true
        }
        async fn knn(&self, _req: crate::storage::KnnRequest) -> Result<Vec<crate::storage::ScoredDoc>> {
            unimplemented!()
        }
        async fn bm25(&self, _req: crate::storage::Bm25Request) -> Result<Vec<crate::storage::ScoredDoc>> {
            unimplemented!()
        }
        async fn list(&self, _req: crate::storage::ListRequest) -> Result<Vec<crate::storage::ScoredDoc>> {
            unimplemented!()
        }
        async fn count(&self, _index: &str) -> Result<usize> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn second_embed_is_a_cache_hit_with_zero_tokens() {
        let provider = Arc::new(CountingProvider {
            calls: Mutex::new(0),
        });
        let storage: Arc<dyn StorageAdapter> = Arc::new(InMemoryKv {
            map: Mutex::new(HashMap::new()),
        });
        let cache = Cache::new(provider.clone(), storage, "openai", "text-embedding-3-small", "vecdex:");

        let first = cache.embed("document: hello").await.unwrap();
        assert_eq!(first.total_tokens, 3);

        let second = cache.embed("document: hello").await.unwrap();
        assert_eq!(second.total_tokens, 0);
        assert_eq!(second.embedding, first.embedding);
        assert_eq!(*provider.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn batch_embed_only_calls_inner_for_misses() {
        let provider = Arc::new(CountingProvider {
            calls: Mutex::new(0),
        });
        let storage: Arc<dyn StorageAdapter> = Arc::new(InMemoryKv {
            map: Mutex::new(HashMap::new()),
        });
        let cache = Cache::new(provider.clone(), storage, "openai", "text-embedding-3-small", "vecdex:");

        cache.embed("document: a").await.unwrap();
        let result = cache
            .batch_embed(&["document: a".to_string(), "document: b".to_string()])
            .await
            .unwrap();
        assert_eq!(result.embeddings.len(), 2);
        // One call for the initial single embed, one for the single miss ("b").
        assert_eq!(*provider.calls.lock().unwrap(), 2);
    }
}
