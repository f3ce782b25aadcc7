//! End-to-end coverage over an in-memory `StorageAdapter`/`EmbeddingPipeline`
//! double, exercising collection creation, document upsert/get/patch,
//! semantic search, and batch upsert in one flow.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use vecdex_core::embedding::{BatchEmbedResult, EmbedResult, EmbeddingPipeline};
use vecdex_core::model::{CollectionType, Field, FieldType};
use vecdex_core::storage::{
    Bm25Request, IndexSchema, KnnRequest, ListRequest, ScoredDoc, StorageAdapter,
};
use vecdex_core::{
    BatchService, BatchUpsertItem, CollectionManager, DocumentManager, Error, Result,
    VecdexConfig, VecdexService,
};

/// A purely in-memory storage double. Hash/JSON/KV live in one map keyed by
/// storage key; indexes are tracked by name only (schema is discarded,
/// since the fake doesn't enforce it) and searched by a brute-force scan
/// over the matching key prefix.
#[derive(Default)]
struct FakeStorage {
    hashes: Mutex<HashMap<String, HashMap<String, String>>>,
    json: Mutex<HashMap<String, Value>>,
    kv: Mutex<HashMap<String, String>>,
    indexes: Mutex<HashMap<String, IndexSchema>>,
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[async_trait]
impl StorageAdapter for FakeStorage {
    async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        let mut hashes = self.hashes.lock();
        let entry = hashes.entry(key.to_string()).or_default();
        for (f, v) in fields {
            entry.insert(f.clone(), v.clone());
        }
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        Ok(self.hashes.lock().get(key).cloned().unwrap_or_default())
    }

    async fn hgetall_multi(&self, keys: &[String]) -> Result<Vec<HashMap<String, String>>> {
        let hashes = self.hashes.lock();
        Ok(keys.iter().map(|k| hashes.get(k).cloned().unwrap_or_default()).collect())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .hashes
            .lock()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn json_set(&self, key: &str, _path: &str, value: &Value) -> Result<()> {
        self.json.lock().insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn json_set_multi(&self, entries: &[(String, Value)]) -> Result<()> {
        let mut json = self.json.lock();
        for (key, value) in entries {
            json.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn json_get(&self, key: &str, _path: &str) -> Result<Option<Value>> {
        Ok(self.json.lock().get(key).cloned())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.kv.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.kv.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.hashes.lock().remove(key);
        self.json.lock().remove(key);
        self.kv.lock().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.hashes.lock().contains_key(key)
            || self.json.lock().contains_key(key)
            || self.kv.lock().contains_key(key))
    }

    async fn incrby(&self, key: &str, by: i64) -> Result<i64> {
        let mut kv = self.kv.lock();
        let current: i64 = kv.get(key).and_then(|v| v.parse().ok()).unwrap_or(0);
        let next = current + by;
        kv.insert(key.to_string(), next.to_string());
        Ok(next)
    }

    async fn expire_nx(&self, _key: &str, _ttl_secs: u64) -> Result<()> {
        Ok(())
    }

    async fn create_index(&self, schema: &IndexSchema) -> Result<()> {
        let mut indexes = self.indexes.lock();
        if indexes.contains_key(&schema.name) {
            return Err(Error::AlreadyExists(schema.name.clone()));
        }
        indexes.insert(schema.name.clone(), schema.clone());
        Ok(())
    }

    async fn drop_index(&self, name: &str) -> Result<()> {
        self.indexes
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    async fn index_exists(&self, name: &str) -> Result<bool> {
        Ok(self.indexes.lock().contains_key(name))
    }

    fn supports_bm25(&self) -> bool {
        true
    }

    async fn knn(&self, req: KnnRequest) -> Result<Vec<ScoredDoc>> {
        let prefix = self
            .indexes
            .lock()
            .get(&req.index)
            .map(|s| s.key_prefix.clone())
            .unwrap_or_default();
        let json = self.json.lock();
        let mut scored: Vec<ScoredDoc> = json
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, v)| {
                let vector: Vec<f32> = v
                    .get("__vector")?
                    .as_array()?
                    .iter()
                    .map(|x| x.as_f64().unwrap_or(0.0) as f32)
                    .collect();
                let score = if req.raw_scores {
                    vector.iter().zip(&req.vector).map(|(a, b)| (a - b).powi(2)).sum::<f32>().sqrt()
                } else {
                    cosine(&vector, &req.vector)
                };
                Some(ScoredDoc {
                    key: k.clone(),
                    score,
                    payload: Some(v.clone()),
                })
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(req.k);
        Ok(scored)
    }

    async fn bm25(&self, req: Bm25Request) -> Result<Vec<ScoredDoc>> {
        let prefix = self
            .indexes
            .lock()
            .get(&req.index)
            .map(|s| s.key_prefix.clone())
            .unwrap_or_default();
        let json = self.json.lock();
        let needle = req.query.to_lowercase();
        let mut scored: Vec<ScoredDoc> = json
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, v)| {
                let content = v.get("__content")?.as_str()?.to_lowercase();
                let hits = content.matches(&needle).count() as f32;
                if hits == 0.0 {
                    return None;
                }
                Some(ScoredDoc {
                    key: k.clone(),
                    score: hits,
                    payload: Some(v.clone()),
                })
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(req.top_k);
        Ok(scored)
    }

    async fn list(&self, req: ListRequest) -> Result<Vec<ScoredDoc>> {
        let prefix = self
            .indexes
            .lock()
            .get(&req.index)
            .map(|s| s.key_prefix.clone())
            .unwrap_or_default();
        let json = self.json.lock();
        let mut keys: Vec<&String> = json.keys().filter(|k| k.starts_with(&prefix)).collect();
        keys.sort();
        Ok(keys
            .into_iter()
            .skip(req.offset)
            .take(req.limit)
            .map(|k| ScoredDoc {
                key: k.clone(),
                score: 0.0,
                payload: json.get(k).cloned(),
            })
            .collect())
    }

    async fn count(&self, index: &str) -> Result<usize> {
        let prefix = self
            .indexes
            .lock()
            .get(index)
            .map(|s| s.key_prefix.clone())
            .unwrap_or_default();
        Ok(self.json.lock().keys().filter(|k| k.starts_with(&prefix)).count())
    }
}

/// A deterministic stub embedder: every text maps to a fixed-dimension
/// vector derived from its byte length, so repeated calls are stable
/// without hitting a real provider.
struct StubEmbedder {
    dim: usize,
}

#[async_trait]
impl EmbeddingPipeline for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbedResult> {
        let mut embedding = vec![0.0_f32; self.dim];
        embedding[0] = text.len() as f32;
        Ok(EmbedResult {
            embedding,
            prompt_tokens: 3,
            total_tokens: 3,
        })
    }

    async fn batch_embed(&self, texts: &[String]) -> Result<BatchEmbedResult> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for t in texts {
            embeddings.push(self.embed(t).await?.embedding);
        }
        Ok(BatchEmbedResult {
            embeddings,
            prompt_tokens: 3 * texts.len() as u64,
            total_tokens: 3 * texts.len() as u64,
        })
    }
}

fn test_config() -> VecdexConfig {
    let mut config = VecdexConfig::default();
    config.storage.key_prefix = "vecdex:".to_string();
    config
}

/// A text-collection harness wired by hand with a [`StubEmbedder`] instead
/// of through [`VecdexService::build`], which always dials the real HTTP
/// provider — not something a test should ever reach out to.
struct TextHarness {
    collections: Arc<CollectionManager>,
    documents: Arc<DocumentManager>,
    batch: Arc<BatchService>,
}

fn text_harness(storage: Arc<dyn StorageAdapter>, dim: usize) -> TextHarness {
    let config = test_config();
    let collections = Arc::new(CollectionManager::new(storage.clone(), &config));
    let embedder: Arc<dyn EmbeddingPipeline> = Arc::new(StubEmbedder { dim });
    let documents = Arc::new(DocumentManager::new(
        storage.clone(),
        collections.clone(),
        embedder,
        config.storage.key_prefix.clone(),
    ));
    let batch = Arc::new(BatchService::new(storage, collections.clone(), documents.clone(), &config));
    TextHarness {
        collections,
        documents,
        batch,
    }
}

#[tokio::test]
async fn create_upsert_get_roundtrips_content_and_tags() {
    let storage: Arc<dyn StorageAdapter> = Arc::new(FakeStorage::default());
    let harness = text_harness(storage, 4);

    let collection = harness
        .collections
        .create(
            "notes",
            CollectionType::Text,
            vec![Field {
                name: "lang".to_string(),
                field_type: FieldType::Tag,
            }],
            4,
            0,
        )
        .await
        .unwrap();
    assert_eq!(collection.revision, 1);

    let mut tags = HashMap::new();
    tags.insert("lang".to_string(), "en".to_string());
    let outcome = harness
        .documents
        .upsert("notes", "a", "hello", tags.clone(), HashMap::new())
        .await
        .unwrap();
    assert!(outcome.created);
    assert_eq!(outcome.document.revision, 1);
    assert_eq!(outcome.tokens_used, 3);

    let fetched = harness.documents.get("notes", "a").await.unwrap();
    assert_eq!(fetched.content, "hello");
    assert_eq!(fetched.tags, tags);
    assert!(fetched.revision >= 1);
}

#[tokio::test]
async fn patch_without_content_leaves_revision_unchanged() {
    let storage: Arc<dyn StorageAdapter> = Arc::new(FakeStorage::default());
    let harness = text_harness(storage, 4);
    harness
        .collections
        .create("notes", CollectionType::Text, vec![], 4, 0)
        .await
        .unwrap();
    harness
        .documents
        .upsert("notes", "a", "hello", HashMap::new(), HashMap::new())
        .await
        .unwrap();

    let patch = vecdex_core::DocumentPatch {
        content: None,
        tags: HashMap::new(),
        numerics: HashMap::new(),
    };
    let outcome = harness.documents.patch("notes", "a", patch, None).await.unwrap();
    assert_eq!(outcome.document.revision, 1);
    assert_eq!(outcome.document.content, "hello");
}

#[tokio::test]
async fn batch_upsert_reports_per_item_success() {
    let storage: Arc<dyn StorageAdapter> = Arc::new(FakeStorage::default());
    let harness = text_harness(storage, 4);
    harness
        .collections
        .create("notes", CollectionType::Text, vec![], 4, 0)
        .await
        .unwrap();

    let items = vec![
        BatchUpsertItem {
            id: "a".to_string(),
            content: "first".to_string(),
            tags: HashMap::new(),
            numerics: HashMap::new(),
        },
        BatchUpsertItem {
            id: "b".to_string(),
            content: "second".to_string(),
            tags: HashMap::new(),
            numerics: HashMap::new(),
        },
    ];
    let report = harness.batch.upsert("notes", items).await.unwrap();
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 0);
}

#[tokio::test]
async fn geo_collection_upserts_ecef_vector_from_coordinates() {
    // Geo upserts never call the embedder, so the full VecdexService (with
    // its real HTTP-backed embedding pipeline) is safe to exercise here.
    let storage: Arc<dyn StorageAdapter> = Arc::new(FakeStorage::default());
    let service = VecdexService::build(test_config(), storage).unwrap();
    service
        .collections
        .create("places", CollectionType::Geo, vec![], 3, 0)
        .await
        .unwrap();

    let mut numerics = HashMap::new();
    numerics.insert("latitude".to_string(), 34.75);
    numerics.insert("longitude".to_string(), 32.4);
    let outcome = service
        .documents
        .upsert("places", "p1", "a place", HashMap::new(), numerics)
        .await
        .unwrap();
    assert_eq!(outcome.document.vector.len(), 3);
    assert_eq!(outcome.tokens_used, 0);
}
