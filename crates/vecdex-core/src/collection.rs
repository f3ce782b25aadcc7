//! CollectionManager: create/read/delete collections and compile their
//! backend index definitions (§4.3).

use crate::config::VecdexConfig;
use crate::error::{Error, Result};
use crate::model::collection::{Collection, CollectionType, Field, FieldType};
use crate::model::document::{collection_metadata_key, document_key_prefix, index_name};
use crate::storage::{
    IndexField, IndexFieldType, IndexSchema, StorageAdapter, StorageKind, VectorAlgo,
    VectorFieldOptions, VectorMetric,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Creates, reads, lists and deletes collections, translating a
/// [`Collection`] into the backend's index schema (§4.3).
pub struct CollectionManager {
    storage: Arc<dyn StorageAdapter>,
    key_prefix: String,
    hnsw_m: usize,
    hnsw_ef_construct: usize,
}

impl CollectionManager {
    /// Builds a manager over `storage`, reading HNSW defaults and the key
    /// prefix from `config`.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageAdapter>, config: &VecdexConfig) -> Self {
        Self {
            storage,
            key_prefix: config.storage.key_prefix.clone(),
            hnsw_m: config.vectors.hnsw_m,
            hnsw_ef_construct: config.vectors.hnsw_ef_construct,
        }
    }

    fn compile_schema(&self, collection: &Collection) -> IndexSchema {
        let mut fields: Vec<IndexField> = collection
            .fields
            .iter()
            .map(|field| IndexField {
                name: field.name.clone(),
                alias: None,
                field_type: match field.field_type {
                    FieldType::Tag => IndexFieldType::Tag,
                    FieldType::Numeric => IndexFieldType::Numeric,
                },
                vector: None,
            })
            .collect();

        if collection.collection_type == CollectionType::Text && self.storage.supports_bm25() {
            fields.push(IndexField {
                name: "__content".to_string(),
                alias: None,
                field_type: IndexFieldType::Text,
                vector: None,
            });
        }

        let (algo, metric) = match collection.collection_type {
            CollectionType::Text => (VectorAlgo::Hnsw, VectorMetric::Cosine),
            CollectionType::Geo => (VectorAlgo::Flat, VectorMetric::L2),
        };
        fields.push(IndexField {
            name: "__vector".to_string(),
            alias: Some("vector".to_string()),
            field_type: IndexFieldType::Vector,
            vector: Some(VectorFieldOptions {
                algo,
                dim: collection.vector_dim,
                metric,
                m: self.hnsw_m,
                ef_construct: self.hnsw_ef_construct,
                block_size: 1024,
            }),
        });

        IndexSchema {
            name: index_name(&self.key_prefix, &collection.name),
            storage: StorageKind::Json,
            key_prefix: document_key_prefix(&self.key_prefix, &collection.name),
            fields,
        }
    }

    fn metadata_fields(collection: &Collection) -> Vec<(String, String)> {
        vec![
            ("name".to_string(), collection.name.clone()),
            (
                "type".to_string(),
                collection.collection_type.as_str().to_string(),
            ),
            ("vector_dim".to_string(), collection.vector_dim.to_string()),
            ("created_at".to_string(), collection.created_at.to_string()),
            ("revision".to_string(), collection.revision.to_string()),
            ("fields".to_string(), collection.encode_fields()),
        ]
    }

    fn from_metadata(name: &str, map: &HashMap<String, String>) -> Result<Collection> {
        let collection_type = map
            .get("type")
            .and_then(|s| CollectionType::parse(s))
            .ok_or_else(|| {
                Error::Internal(format!("collection '{name}' metadata missing/invalid type"))
            })?;
        let vector_dim: usize = map
            .get("vector_dim")
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                Error::Internal(format!(
                    "collection '{name}' metadata missing/invalid vector_dim"
                ))
            })?;
        let created_at: i64 = map
            .get("created_at")
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                Error::Internal(format!(
                    "collection '{name}' metadata missing/invalid created_at"
                ))
            })?;
        let revision: u64 = map.get("revision").and_then(|s| s.parse().ok()).unwrap_or(1);
        let fields = Collection::decode_fields(map.get("fields").map(String::as_str).unwrap_or(""))?;
        Ok(Collection {
            name: name.to_string(),
            collection_type,
            fields,
            vector_dim,
            created_at,
            revision,
        })
    }

    /// Creates a collection: write metadata, then `FT.CREATE` the index. A
    /// failed `FT.CREATE` is compensated by deleting the metadata hash
    /// (§4.3 "write sequence").
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExists`] if the metadata already exists, or
    /// whatever [`Error`] the schema/index creation step raised.
    pub async fn create(
        &self,
        name: &str,
        collection_type: CollectionType,
        fields: Vec<Field>,
        vector_dim: usize,
        created_at_ms: i64,
    ) -> Result<Collection> {
        let collection = Collection::new(name, collection_type, fields, vector_dim, created_at_ms)?;
        let meta_key = collection_metadata_key(&self.key_prefix, &collection.name);

        if crate::cancel::cancellable(self.storage.exists(&meta_key)).await? {
            return Err(Error::AlreadyExists(collection.name.clone()));
        }

        crate::cancel::cancellable(self.storage.hset(&meta_key, &Self::metadata_fields(&collection))).await?;

        let schema = self.compile_schema(&collection);
        if let Err(e) = crate::cancel::cancellable(self.storage.create_index(&schema)).await {
            let _ = self.storage.del(&meta_key).await;
            return Err(e);
        }

        Ok(collection)
    }

    /// Fetches a collection's metadata.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no metadata hash exists at the
    /// collection's key.
    pub async fn get(&self, name: &str) -> Result<Collection> {
        let meta_key = collection_metadata_key(&self.key_prefix, name);
        let map = crate::cancel::cancellable(self.storage.hgetall(&meta_key)).await?;
        if map.is_empty() {
            return Err(Error::NotFound(name.to_string()));
        }
        Self::from_metadata(name, &map)
    }

    /// Lists every collection, sorted by creation time (§4.3).
    ///
    /// # Errors
    ///
    /// Propagates storage failures, or [`Error::Internal`] on corrupt
    /// metadata.
    pub async fn list(&self) -> Result<Vec<Collection>> {
        let prefix = format!("{}collection:", self.key_prefix);
        let keys = crate::cancel::cancellable(self.storage.scan_prefix(&prefix)).await?;
        let maps = crate::cancel::cancellable(self.storage.hgetall_multi(&keys)).await?;
        let mut collections = Vec::with_capacity(keys.len());
        for (key, map) in keys.iter().zip(maps.iter()) {
            if map.is_empty() {
                continue;
            }
            let name = key.strip_prefix(&prefix).unwrap_or(key);
            collections.push(Self::from_metadata(name, map)?);
        }
        collections.sort_by_key(|c| c.created_at);
        Ok(collections)
    }

    /// Deletes a collection: drop the metadata hash, then `FT.DROPINDEX`.
    /// A failed drop restores the metadata and surfaces the error (§4.3).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the collection does not exist.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let meta_key = collection_metadata_key(&self.key_prefix, name);
        let map = crate::cancel::cancellable(self.storage.hgetall(&meta_key)).await?;
        if map.is_empty() {
            return Err(Error::NotFound(name.to_string()));
        }
        let collection = Self::from_metadata(name, &map)?;
        let idx_name = index_name(&self.key_prefix, name);

        crate::cancel::cancellable(self.storage.del(&meta_key)).await?;
        if let Err(e) = crate::cancel::cancellable(self.storage.drop_index(&idx_name)).await {
            let _ = self
                .storage
                .hset(&meta_key, &Self::metadata_fields(&collection))
                .await;
            return Err(e);
        }
        Ok(())
    }

    /// True iff both the metadata hash and the backend index exist.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn exists(&self, name: &str) -> Result<bool> {
        let meta_key = collection_metadata_key(&self.key_prefix, name);
        let idx_name = index_name(&self.key_prefix, name);
        let exists = crate::cancel::cancellable(self.storage.exists(&meta_key)).await?;
        let indexed = crate::cancel::cancellable(self.storage.index_exists(&idx_name)).await?;
        Ok(exists && indexed)
    }
}
