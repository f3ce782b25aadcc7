//! DocumentManager: upsert, patch, list, get, delete (§4.4).

use crate::collection::CollectionManager;
use crate::embedding::EmbeddingPipeline;
use crate::error::{Error, Result};
use crate::geo;
use crate::model::collection::{Collection, CollectionType, FieldType};
use crate::model::document::{document_key, document_key_prefix, index_name, Document};
use crate::storage::{ListRequest, StorageAdapter};
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of an upsert: the persisted document, whether it was newly
/// created, and the embedding tokens spent producing it.
pub struct UpsertOutcome {
    /// The document as persisted.
    pub document: Document,
    /// True iff the key did not exist before this call (§4.4 "EXISTS probe
    /// before SET").
    pub created: bool,
    /// Tokens billed by the embedding provider for this call (0 for geo
    /// collections or on a cache hit).
    pub tokens_used: u64,
}

/// Outcome of a patch.
pub struct PatchOutcome {
    /// The document after the patch was applied.
    pub document: Document,
    /// Tokens billed for a content re-embed (0 if content did not change,
    /// or for geo collections).
    pub tokens_used: u64,
}

/// A partial update: a key absent from the map is left untouched, a key
/// present with `None` deletes it, any other value replaces it (§4.4).
#[derive(Debug, Clone, Default)]
pub struct DocumentPatch {
    /// New content, if the caller wants to replace it.
    pub content: Option<String>,
    /// Tag edits: `Some(value)` sets, `None` deletes.
    pub tags: HashMap<String, Option<String>>,
    /// Numeric edits: `Some(value)` sets, `None` deletes.
    pub numerics: HashMap<String, Option<f64>>,
}

/// Upserts, patches, lists, fetches and deletes documents within a
/// collection, validating every write against the collection's declared
/// schema (§4.4).
pub struct DocumentManager {
    storage: Arc<dyn StorageAdapter>,
    collections: Arc<CollectionManager>,
    embedder: Arc<dyn EmbeddingPipeline>,
    key_prefix: String,
}

impl DocumentManager {
    /// Builds a manager over `storage`/`collections`, using `embedder` as
    /// the document-side embedding pipeline (§4.2 "two independent pipeline
    /// instances").
    #[must_use]
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        collections: Arc<CollectionManager>,
        embedder: Arc<dyn EmbeddingPipeline>,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            collections,
            embedder,
            key_prefix: key_prefix.into(),
        }
    }

    pub(crate) fn validate_field_types<'a>(
        collection: &Collection,
        tag_keys: impl Iterator<Item = &'a str>,
        numeric_keys: impl Iterator<Item = &'a str>,
    ) -> Result<()> {
        for key in tag_keys {
            match collection.fields.iter().find(|f| f.name == key) {
                Some(f) if f.field_type == FieldType::Tag => {}
                Some(_) => {
                    return Err(Error::InvalidSchema(format!(
                        "field '{key}' is declared numeric, not tag"
                    )))
                }
                None => {
                    return Err(Error::InvalidSchema(format!(
                        "unknown tag field '{key}'"
                    )))
                }
            }
        }
        for key in numeric_keys {
            match collection.fields.iter().find(|f| f.name == key) {
                Some(f) if f.field_type == FieldType::Numeric => {}
                Some(_) => {
                    return Err(Error::InvalidSchema(format!(
                        "field '{key}' is declared tag, not numeric"
                    )))
                }
                None => {
                    return Err(Error::InvalidSchema(format!(
                        "unknown numeric field '{key}'"
                    )))
                }
            }
        }
        Ok(())
    }

    pub(crate) fn geo_vector(numerics: &HashMap<String, f64>) -> Result<[f32; 3]> {
        let lat = numerics
            .get("latitude")
            .copied()
            .ok_or_else(|| Error::GeoQueryInvalid("missing latitude".to_string()))?;
        let lon = numerics
            .get("longitude")
            .copied()
            .ok_or_else(|| Error::GeoQueryInvalid("missing longitude".to_string()))?;
        geo::validate_lat_lon(lat, lon)?;
        Ok(geo::to_ecef(lat, lon))
    }

    async fn embed_for_write(&self, collection: &Collection, content: &str) -> Result<(Vec<f32>, u64)> {
        let result = crate::cancel::cancellable(self.embedder.embed(content)).await?;
        if result.embedding.len() != collection.vector_dim {
            return Err(Error::VectorDimMismatch {
                expected: collection.vector_dim,
                actual: result.embedding.len(),
            });
        }
        Ok((result.embedding, result.total_tokens))
    }

    /// Creates or replaces a document (§4.4 "Upsert").
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the collection doesn't exist,
    /// [`Error::InvalidSchema`] for an unknown or mistyped tag/numeric, or
    /// [`Error::VectorDimMismatch`]/[`Error::GeoQueryInvalid`] depending on
    /// collection type.
    pub async fn upsert(
        &self,
        collection_name: &str,
        id: &str,
        content: &str,
        tags: HashMap<String, String>,
        numerics: HashMap<String, f64>,
    ) -> Result<UpsertOutcome> {
        Document::validate_id(id)?;
        Document::validate_content(content)?;
        let collection = self.collections.get(collection_name).await?;
        Self::validate_field_types(
            &collection,
            tags.keys().map(String::as_str),
            numerics.keys().map(String::as_str),
        )?;

        let (vector, tokens_used) = match collection.collection_type {
            CollectionType::Text => self.embed_for_write(&collection, content).await?,
            CollectionType::Geo => (Self::geo_vector(&numerics)?.to_vec(), 0),
        };

        let key = document_key(&self.key_prefix, collection_name, id);
        let created = !crate::cancel::cancellable(self.storage.exists(&key)).await?;
        let revision = if created {
            1
        } else {
            let body = crate::cancel::cancellable(self.storage.json_get(&key, "$"))
                .await?
                .ok_or_else(|| {
                    Error::Internal(format!(
                        "document '{id}' disappeared between exists probe and read"
                    ))
                })?;
            Document::from_json_body(id, &body)?.revision + 1
        };

        let document = Document {
            id: id.to_string(),
            content: content.to_string(),
            tags,
            numerics,
            vector,
            revision,
        };
        crate::cancel::cancellable(self.storage.json_set(&key, "$", &document.to_json_body())).await?;

        Ok(UpsertOutcome {
            document,
            created,
            tokens_used,
        })
    }

    /// Applies a partial update (§4.4 "Patch").
    ///
    /// # Errors
    ///
    /// Returns [`Error::DocumentNotFound`] if the document doesn't exist,
    /// [`Error::RevisionConflict`] if `expected_revision` is supplied and
    /// stale, and the same validation errors as [`Self::upsert`].
    pub async fn patch(
        &self,
        collection_name: &str,
        id: &str,
        patch: DocumentPatch,
        expected_revision: Option<u64>,
    ) -> Result<PatchOutcome> {
        let collection = self.collections.get(collection_name).await?;
        Self::validate_field_types(
            &collection,
            patch.tags.keys().map(String::as_str),
            patch.numerics.keys().map(String::as_str),
        )?;
        if let Some(content) = &patch.content {
            Document::validate_content(content)?;
        }

        let key = document_key(&self.key_prefix, collection_name, id);
        let body = crate::cancel::cancellable(self.storage.json_get(&key, "$"))
            .await?
            .ok_or_else(|| Error::DocumentNotFound(id.to_string(), collection_name.to_string()))?;
        let current = Document::from_json_body(id, &body)?;

        if let Some(expected) = expected_revision {
            if expected != current.revision {
                return Err(Error::RevisionConflict {
                    current: current.revision,
                });
            }
        }

        let mut tags = current.tags.clone();
        for (k, v) in &patch.tags {
            match v {
                Some(value) => {
                    tags.insert(k.clone(), value.clone());
                }
                None => {
                    tags.remove(k);
                }
            }
        }

        let mut numerics = current.numerics.clone();
        for (k, v) in &patch.numerics {
            match v {
                Some(value) => {
                    numerics.insert(k.clone(), *value);
                }
                None => {
                    numerics.remove(k);
                }
            }
        }

        let content = patch.content.clone().unwrap_or_else(|| current.content.clone());

        let (vector, tokens_used) = match collection.collection_type {
            CollectionType::Text if patch.content.is_some() => {
                self.embed_for_write(&collection, &content).await?
            }
            CollectionType::Text => (current.vector.clone(), 0),
            CollectionType::Geo if !patch.numerics.is_empty() => {
                (Self::geo_vector(&numerics)?.to_vec(), 0)
            }
            CollectionType::Geo => (current.vector.clone(), 0),
        };

        let revision = if patch.content.is_some() {
            current.revision + 1
        } else {
            current.revision
        };

        let document = Document {
            id: id.to_string(),
            content,
            tags,
            numerics,
            vector,
            revision,
        };
        crate::cancel::cancellable(self.storage.json_set(&key, "$", &document.to_json_body())).await?;

        Ok(PatchOutcome {
            document,
            tokens_used,
        })
    }

    /// Fetches a document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the collection doesn't exist, or
    /// [`Error::DocumentNotFound`] if the document doesn't.
    pub async fn get(&self, collection_name: &str, id: &str) -> Result<Document> {
        self.collections.get(collection_name).await?;
        let key = document_key(&self.key_prefix, collection_name, id);
        let body = crate::cancel::cancellable(self.storage.json_get(&key, "$"))
            .await?
            .ok_or_else(|| Error::DocumentNotFound(id.to_string(), collection_name.to_string()))?;
        Document::from_json_body(id, &body)
    }

    /// Deletes a document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the collection doesn't exist, or
    /// [`Error::DocumentNotFound`] if the document doesn't.
    pub async fn delete(&self, collection_name: &str, id: &str) -> Result<()> {
        self.collections.get(collection_name).await?;
        let key = document_key(&self.key_prefix, collection_name, id);
        if !crate::cancel::cancellable(self.storage.exists(&key)).await? {
            return Err(Error::DocumentNotFound(id.to_string(), collection_name.to_string()));
        }
        crate::cancel::cancellable(self.storage.del(&key)).await
    }

    /// Total document count for a collection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the collection doesn't exist.
    pub async fn count(&self, collection_name: &str) -> Result<usize> {
        self.collections.get(collection_name).await?;
        let idx = index_name(&self.key_prefix, collection_name);
        crate::cancel::cancellable(self.storage.count(&idx)).await
    }

    /// Paginates a collection's documents in index order (§4.4 "List").
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the collection doesn't exist, or
    /// [`Error::InvalidSchema`] if `cursor` is not a non-negative integer.
    pub async fn list(
        &self,
        collection_name: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<(Vec<Document>, Option<String>)> {
        self.collections.get(collection_name).await?;
        let offset: usize = match cursor {
            None => 0,
            Some(c) => c
                .parse()
                .map_err(|_| Error::InvalidSchema(format!("malformed cursor '{c}'")))?,
        };

        let idx = index_name(&self.key_prefix, collection_name);
        let prefix = document_key_prefix(&self.key_prefix, collection_name);
        let results = crate::cancel::cancellable(self.storage.list(ListRequest {
            index: idx,
            offset,
            limit: limit + 1,
        }))
        .await?;

        let has_more = results.len() > limit;
        let page = if has_more {
            &results[..limit]
        } else {
            &results[..]
        };

        let mut documents = Vec::with_capacity(page.len());
        for scored in page {
            let id = scored.key.strip_prefix(&prefix).unwrap_or(&scored.key);
            let payload = scored.payload.as_ref().ok_or_else(|| {
                Error::Internal(format!("listing '{}' returned no payload", scored.key))
            })?;
            documents.push(Document::from_json_body(id, payload)?);
        }

        let next_cursor = has_more.then(|| (offset + limit).to_string());
        Ok((documents, next_cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_field_types_rejects_unknown_and_mistyped() {
        let collection = Collection::new(
            "notes",
            CollectionType::Text,
            vec![crate::model::collection::Field {
                name: "lang".to_string(),
                field_type: FieldType::Tag,
            }],
            4,
            0,
        )
        .unwrap();

        assert!(DocumentManager::validate_field_types(&collection, std::iter::empty(), std::iter::once("lang")).is_err());
        assert!(DocumentManager::validate_field_types(&collection, std::iter::once("missing"), std::iter::empty()).is_err());
        assert!(DocumentManager::validate_field_types(&collection, std::iter::once("lang"), std::iter::empty()).is_ok());
    }

    #[test]
    fn geo_vector_requires_both_coordinates() {
        let mut numerics = HashMap::new();
        numerics.insert("latitude".to_string(), 34.75);
        assert!(DocumentManager::geo_vector(&numerics).is_err());
        numerics.insert("longitude".to_string(), 32.4);
        assert!(DocumentManager::geo_vector(&numerics).is_ok());
    }
}
