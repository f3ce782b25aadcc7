//! BatchService: batch upsert/delete with per-item results and quota
//! cascade (§4.6).

use crate::collection::CollectionManager;
use crate::config::VecdexConfig;
use crate::document::DocumentManager;
use crate::error::Error;
use crate::model::collection::{Collection, CollectionType};
use crate::model::document::{document_key, Document};
use crate::storage::StorageAdapter;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// One document to upsert in a batch call.
#[derive(Debug, Clone)]
pub struct BatchUpsertItem {
    /// Document id.
    pub id: String,
    /// Free text content (ignored for geo collections beyond validation).
    pub content: String,
    /// Tag attribute values.
    pub tags: HashMap<String, String>,
    /// Numeric attribute values (`latitude`/`longitude` for geo).
    pub numerics: HashMap<String, f64>,
}

/// Whether an item in a batch result succeeded or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    /// The item was persisted/deleted successfully.
    Ok,
    /// The item failed; see `error_code`/`error_message`.
    Error,
}

/// Per-item outcome of a batch call, in input order (§4.6).
#[derive(Debug, Clone)]
pub struct BatchItemResult {
    /// The item's id.
    pub id: String,
    /// Success or failure.
    pub status: BatchStatus,
    /// Stable error code (see [`Error::code`]), present iff `status ==
    /// Error`.
    pub error_code: Option<&'static str>,
    /// Human-readable error detail, present iff `status == Error`.
    pub error_message: Option<String>,
}

impl BatchItemResult {
    fn ok(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: BatchStatus::Ok,
            error_code: None,
            error_message: None,
        }
    }

    fn error(id: impl Into<String>, err: &Error) -> Self {
        Self {
            id: id.into(),
            status: BatchStatus::Error,
            error_code: Some(err.code()),
            error_message: Some(err.to_string()),
        }
    }

    fn error_parts(id: impl Into<String>, code: &'static str, message: String) -> Self {
        Self {
            id: id.into(),
            status: BatchStatus::Error,
            error_code: Some(code),
            error_message: Some(message),
        }
    }
}

/// Full report of a batch call: per-item results plus success/failure
/// counts, satisfying `succeeded + failed == items.len()` (§4.6, §8).
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// One entry per input item, in input order.
    pub items: Vec<BatchItemResult>,
    /// Count of `status == Ok` entries.
    pub succeeded: usize,
    /// Count of `status == Error` entries.
    pub failed: usize,
}

impl BatchReport {
    fn from_items(items: Vec<BatchItemResult>) -> Self {
        let succeeded = items.iter().filter(|i| i.status == BatchStatus::Ok).count();
        let failed = items.len() - succeeded;
        Self {
            items,
            succeeded,
            failed,
        }
    }
}

/// Batch upsert/delete over a collection, with per-item results and quota
/// cascade (§4.6).
pub struct BatchService {
    storage: Arc<dyn StorageAdapter>,
    collections: Arc<CollectionManager>,
    documents: Arc<DocumentManager>,
    key_prefix: String,
    max_batch_size: usize,
}

impl BatchService {
    /// Builds a service over `storage`/`collections`/`documents`, reading
    /// `maxBatchSize` and the key prefix from `config`.
    #[must_use]
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        collections: Arc<CollectionManager>,
        documents: Arc<DocumentManager>,
        config: &VecdexConfig,
    ) -> Self {
        Self {
            storage,
            collections,
            documents,
            key_prefix: config.storage.key_prefix.clone(),
            max_batch_size: config.batch.max_batch_size,
        }
    }

    fn oversized_report(&self, ids: Vec<String>) -> BatchReport {
        let n = ids.len();
        let items = ids
            .into_iter()
            .map(|id| {
                BatchItemResult::error(
                    id,
                    &Error::InvalidSchema(format!(
                        "batch of {n} items exceeds max_batch_size {}",
                        self.max_batch_size
                    )),
                )
            })
            .collect();
        BatchReport::from_items(items)
    }

    /// Upserts every item, returning a report with one entry per item in
    /// input order (§4.6 "Upsert").
    ///
    /// For a geo collection, every item is validated and vectorized
    /// locally; invalid items are recorded as errors without aborting the
    /// rest, and every valid item is persisted via one pipelined
    /// `JSON.SET` round trip. For a text collection, items are upserted one
    /// at a time; an `EmbeddingQuotaExceeded`/`RateLimited` error cascades
    /// to every remaining item without attempting it.
    pub async fn upsert(
        &self,
        collection_name: &str,
        items: Vec<BatchUpsertItem>,
    ) -> crate::error::Result<BatchReport> {
        if items.len() > self.max_batch_size {
            let ids = items.into_iter().map(|i| i.id).collect();
            return Ok(self.oversized_report(ids));
        }

        let collection = self.collections.get(collection_name).await?;
        match collection.collection_type {
            CollectionType::Geo => self.upsert_geo(collection_name, &collection, items).await,
            CollectionType::Text => self.upsert_text(collection_name, items).await,
        }
    }

    async fn upsert_geo(
        &self,
        collection_name: &str,
        collection: &Collection,
        items: Vec<BatchUpsertItem>,
    ) -> crate::error::Result<BatchReport> {
        let mut results = Vec::with_capacity(items.len());
        let mut entries: Vec<(String, Value)> = Vec::new();

        for item in items {
            match Self::build_geo_document(collection, &item) {
                Ok(document) => {
                    let key = document_key(&self.key_prefix, collection_name, &item.id);
                    entries.push((key, document.to_json_body()));
                    results.push(BatchItemResult::ok(item.id));
                }
                Err(e) => results.push(BatchItemResult::error(item.id, &e)),
            }
        }

        if !entries.is_empty() {
            crate::cancel::cancellable(self.storage.json_set_multi(&entries)).await?;
        }
        Ok(BatchReport::from_items(results))
    }

    fn build_geo_document(collection: &Collection, item: &BatchUpsertItem) -> crate::error::Result<Document> {
        Document::validate_id(&item.id)?;
        Document::validate_content(&item.content)?;
        DocumentManager::validate_field_types(
            collection,
            item.tags.keys().map(String::as_str),
            item.numerics.keys().map(String::as_str),
        )?;
        let vector = DocumentManager::geo_vector(&item.numerics)?;
        Ok(Document {
            id: item.id.clone(),
            content: item.content.clone(),
            tags: item.tags.clone(),
            numerics: item.numerics.clone(),
            vector: vector.to_vec(),
            revision: 1,
        })
    }

    async fn upsert_text(
        &self,
        collection_name: &str,
        items: Vec<BatchUpsertItem>,
    ) -> crate::error::Result<BatchReport> {
        let mut results = Vec::with_capacity(items.len());
        let mut cascade: Option<(&'static str, String)> = None;

        for item in items {
            if let Some((code, message)) = &cascade {
                results.push(BatchItemResult::error_parts(item.id, code, message.clone()));
                continue;
            }

            match self
                .documents
                .upsert(collection_name, &item.id, &item.content, item.tags, item.numerics)
                .await
            {
                Ok(_) => results.push(BatchItemResult::ok(item.id)),
                Err(e) => {
                    if e.cascades_batch() {
                        cascade = Some((e.code(), e.to_string()));
                    }
                    results.push(BatchItemResult::error(item.id, &e));
                }
            }
        }

        Ok(BatchReport::from_items(results))
    }

    /// Deletes every id, returning a report with one entry per id in input
    /// order (§4.6 "Delete").
    pub async fn delete(&self, collection_name: &str, ids: Vec<String>) -> crate::error::Result<BatchReport> {
        if ids.len() > self.max_batch_size {
            return Ok(self.oversized_report(ids));
        }

        self.collections.get(collection_name).await?;
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            match self.documents.delete(collection_name, &id).await {
                Ok(()) => results.push(BatchItemResult::ok(id)),
                Err(e) => results.push(BatchItemResult::error(id, &e)),
            }
        }
        Ok(BatchReport::from_items(results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{BatchEmbedResult, EmbedResult, EmbeddingPipeline};
    use crate::error::Result;
    use crate::model::collection::{Field, FieldType};
    use crate::storage::{Bm25Request, IndexSchema, KnnRequest, ListRequest, ScoredDoc};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn geo_collection() -> Collection {
        Collection::new("places", CollectionType::Geo, Vec::<Field>::new(), 3, 0).unwrap()
    }

    #[test]
    fn build_geo_document_rejects_missing_coordinates() {
        let collection = geo_collection();
        let item = BatchUpsertItem {
            id: "a".to_string(),
            content: "castle".to_string(),
            tags: HashMap::new(),
            numerics: HashMap::new(),
        };
        assert!(BatchService::build_geo_document(&collection, &item).is_err());
    }

    #[test]
    fn build_geo_document_rejects_unknown_tag() {
        let collection = geo_collection();
        let mut numerics = HashMap::new();
        numerics.insert("latitude".to_string(), 34.75);
        numerics.insert("longitude".to_string(), 32.4);
        let mut tags = HashMap::new();
        tags.insert("unknown".to_string(), "x".to_string());
        let item = BatchUpsertItem {
            id: "a".to_string(),
            content: "castle".to_string(),
            tags,
            numerics,
        };
        assert!(BatchService::build_geo_document(&collection, &item).is_err());
    }

    #[test]
    fn build_geo_document_succeeds_with_valid_coordinates() {
        let mut collection = geo_collection();
        collection.fields.push(Field {
            name: "kind".to_string(),
            field_type: FieldType::Tag,
        });
        let mut numerics = HashMap::new();
        numerics.insert("latitude".to_string(), 34.75);
        numerics.insert("longitude".to_string(), 32.4);
        let mut tags = HashMap::new();
        tags.insert("kind".to_string(), "castle".to_string());
        let item = BatchUpsertItem {
            id: "paphos-castle".to_string(),
            content: "castle".to_string(),
            tags,
            numerics,
        };
        let doc = BatchService::build_geo_document(&collection, &item).unwrap();
        assert_eq!(doc.vector.len(), 3);
        assert_eq!(doc.revision, 1);
    }

    #[test]
    fn report_counts_succeeded_and_failed() {
        let items = vec![
            BatchItemResult::ok("a"),
            BatchItemResult::error("b", &Error::InvalidSchema("bad".to_string())),
        ];
        let report = BatchReport::from_items(items);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
    }

    /// Storage double covering only what a text-collection batch upsert
    /// touches: collection metadata/index bookkeeping and a `JSON.SET` per
    /// item. No search surface, since the cascade test never searches.
    #[derive(Default)]
    struct CascadeStorage {
        hashes: parking_lot::Mutex<HashMap<String, HashMap<String, String>>>,
        json: parking_lot::Mutex<HashMap<String, Value>>,
        indexes: parking_lot::Mutex<HashMap<String, IndexSchema>>,
    }

    #[async_trait]
    impl StorageAdapter for CascadeStorage {
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
            Ok(self.hashes.lock().keys().filter(|k| k.starts_with(prefix)).cloned().collect())
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
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }
        async fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Ok(())
        }
        async fn del(&self, key: &str) -> Result<()> {
            self.hashes.lock().remove(key);
            self.json.lock().remove(key);
            Ok(())
        }
        async fn exists(&self, key: &str) -> Result<bool> {
            Ok(self.hashes.lock().contains_key(key) || self.json.lock().contains_key(key))
        }
        async fn incrby(&self, _key: &str, by: i64) -> Result<i64> {
            Ok(by)
        }
        async fn expire_nx(&self, _key: &str, _ttl_secs: u64) -> Result<()> {
            Ok(())
        }
        async fn create_index(&self, schema: &IndexSchema) -> Result<()> {
            self.indexes.lock().insert(schema.name.clone(), schema.clone());
            Ok(())
        }
        async fn drop_index(&self, name: &str) -> Result<()> {
            self.indexes.lock().remove(name);
            Ok(())
        }
        async fn index_exists(&self, name: &str) -> Result<bool> {
            Ok(self.indexes.lock().contains_key(name))
        }
        fn supports_bm25(&self) -> bool {
            true
        }
        async fn knn(&self, _req: KnnRequest) -> Result<Vec<ScoredDoc>> {
            Ok(Vec::new())
        }
        async fn bm25(&self, _req: Bm25Request) -> Result<Vec<ScoredDoc>> {
            Ok(Vec::new())
        }
        async fn list(&self, _req: ListRequest) -> Result<Vec<ScoredDoc>> {
            Ok(Vec::new())
        }
        async fn count(&self, _index: &str) -> Result<usize> {
            Ok(0)
        }
    }

    /// Succeeds for the first `fail_at - 1` calls, then fails every call
    /// from `fail_at` onward with a cascading error. Tracks how many times
    /// `embed` was actually invoked, so the cascade test can assert the
    /// items after the failure were never attempted.
    struct FlakyEmbedder {
        fail_at: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingPipeline for FlakyEmbedder {
        async fn embed(&self, text: &str) -> Result<EmbedResult> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.fail_at {
                return Err(Error::RateLimited("429".to_string()));
            }
            Ok(EmbedResult {
                embedding: vec![text.len() as f32, 0.0, 0.0],
                prompt_tokens: 1,
                total_tokens: 1,
            })
        }

        async fn batch_embed(&self, texts: &[String]) -> Result<BatchEmbedResult> {
            let mut embeddings = Vec::with_capacity(texts.len());
            for t in texts {
                embeddings.push(self.embed(t).await?.embedding);
            }
            Ok(BatchEmbedResult {
                embeddings,
                prompt_tokens: texts.len() as u64,
                total_tokens: texts.len() as u64,
            })
        }
    }

    #[tokio::test]
    async fn rate_limited_error_cascades_to_every_remaining_item() {
        let storage: Arc<dyn StorageAdapter> = Arc::new(CascadeStorage::default());
        let mut config = VecdexConfig::default();
        config.storage.key_prefix = "vecdex:".to_string();

        let collections = Arc::new(CollectionManager::new(storage.clone(), &config));
        collections
            .create("notes", CollectionType::Text, Vec::new(), 3, 0)
            .await
            .unwrap();

        let embedder: Arc<dyn EmbeddingPipeline> = Arc::new(FlakyEmbedder {
            fail_at: 2,
            calls: AtomicUsize::new(0),
        });
        let documents = Arc::new(DocumentManager::new(
            storage.clone(),
            collections.clone(),
            embedder,
            config.storage.key_prefix.clone(),
        ));
        let batch = BatchService::new(storage, collections, documents, &config);

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
            BatchUpsertItem {
                id: "c".to_string(),
                content: "third".to_string(),
                tags: HashMap::new(),
                numerics: HashMap::new(),
            },
        ];

        let report = batch.upsert("notes", items).await.unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(report.items[0].status, BatchStatus::Ok);
        assert_eq!(report.items[1].status, BatchStatus::Error);
        assert_eq!(report.items[1].error_code, Some("rate_limited"));
        assert_eq!(report.items[2].status, BatchStatus::Error);
        assert_eq!(report.items[2].error_code, Some("rate_limited"));
        assert_eq!(report.items[2].id, "c");
    }
}
