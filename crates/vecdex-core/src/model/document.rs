//! Document type and its reserved-key persisted representation (§3, §6).

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Matches document ids.
pub static ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,256}$").unwrap());

/// Document ids a caller may never use — they collide with collection-level
/// routes (`/documents/search`, `/collections`).
pub const RESERVED_DOCUMENT_IDS: [&str; 2] = ["search", "collections"];

/// Maximum content size, in bytes, of a document's `content` field.
pub const MAX_CONTENT_BYTES: usize = 160 * 1024;

/// Reserved JSON key under which the document's free text is stored.
pub const CONTENT_KEY: &str = "__content";

/// Reserved JSON key under which the document's vector is stored.
pub const VECTOR_KEY: &str = "__vector";

/// Reserved JSON key under which the document's revision is stored.
pub const REVISION_KEY: &str = "__revision";

/// A document belonging to a collection (§3). `vector` is populated by the
/// document pipeline (embedding for text, ECEF for geo) before persistence;
/// it is absent on a freshly-constructed, not-yet-vectorized document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Document id, matching [`ID_RE`] and not in [`RESERVED_DOCUMENT_IDS`].
    pub id: String,
    /// Free text content.
    pub content: String,
    /// Tag attribute values, keyed by declared field name.
    pub tags: HashMap<String, String>,
    /// Numeric attribute values, keyed by declared field name.
    pub numerics: HashMap<String, f64>,
    /// The stored vector: an embedding for text collections, an ECEF unit
    /// vector for geo collections.
    pub vector: Vec<f32>,
    /// Monotonic revision, starting at 1.
    pub revision: u64,
}

impl Document {
    /// Validates a document id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSchema`] if the id is malformed or reserved.
    pub fn validate_id(id: &str) -> Result<()> {
        if !ID_RE.is_match(id) {
            return Err(Error::InvalidSchema(format!(
                "document id '{id}' must match {}",
                ID_RE.as_str()
            )));
        }
        if RESERVED_DOCUMENT_IDS.contains(&id) {
            return Err(Error::InvalidSchema(format!(
                "document id '{id}' is reserved"
            )));
        }
        Ok(())
    }

    /// Validates document content: non-empty UTF-8, at most
    /// [`MAX_CONTENT_BYTES`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSchema`] if content is empty or oversized.
    pub fn validate_content(content: &str) -> Result<()> {
        if content.is_empty() {
            return Err(Error::InvalidSchema(
                "content must not be empty".to_string(),
            ));
        }
        if content.len() > MAX_CONTENT_BYTES {
            return Err(Error::InvalidSchema(format!(
                "content is {} bytes, max is {MAX_CONTENT_BYTES}",
                content.len()
            )));
        }
        Ok(())
    }

    /// Builds the JSON body persisted via `JSON.SET`: reserved content,
    /// vector and revision keys, plus every user tag/numeric, flattened to
    /// one object.
    #[must_use]
    pub fn to_json_body(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert(CONTENT_KEY.to_string(), serde_json::json!(self.content));
        map.insert(VECTOR_KEY.to_string(), serde_json::json!(self.vector));
        map.insert(REVISION_KEY.to_string(), serde_json::json!(self.revision));
        for (k, v) in &self.tags {
            map.insert(k.clone(), serde_json::json!(v));
        }
        for (k, v) in &self.numerics {
            map.insert(k.clone(), serde_json::json!(v));
        }
        serde_json::Value::Object(map)
    }

    /// Reconstructs a document from its persisted JSON body plus the id
    /// carried alongside it (the key encodes the id, not the body).
    ///
    /// Splits reserved vs. user-visible fields (§4.5 "Result materialization"):
    /// any top-level key starting with `__` is reserved and excluded from
    /// `tags`/`numerics`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if the body is not a JSON object or its
    /// reserved fields are the wrong shape.
    pub fn from_json_body(id: impl Into<String>, body: &serde_json::Value) -> Result<Self> {
        let obj = body
            .as_object()
            .ok_or_else(|| Error::Internal("document body is not a JSON object".to_string()))?;

        let revision = obj
            .get(REVISION_KEY)
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(1);

        let content = obj
            .get(CONTENT_KEY)
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| Error::Internal("document body missing __content".to_string()))?
            .to_string();

        let vector = obj
            .get(VECTOR_KEY)
            .and_then(serde_json::Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(serde_json::Value::as_f64)
                    .map(|f| f as f32)
                    .collect()
            })
            .unwrap_or_default();

        let mut tags = HashMap::new();
        let mut numerics = HashMap::new();
        for (key, value) in obj {
            if key.starts_with("__") {
                continue;
            }
            match value {
                serde_json::Value::String(s) => {
                    tags.insert(key.clone(), s.clone());
                }
                serde_json::Value::Number(n) => {
                    if let Some(f) = n.as_f64() {
                        numerics.insert(key.clone(), f);
                    }
                }
                _ => {}
            }
        }

        Ok(Self {
            id: id.into(),
            content,
            tags,
            numerics,
            vector,
            revision,
        })
    }
}

/// Builds the deterministic document key `{prefix}{collection}:{id}` (§3, §6).
#[must_use]
pub fn document_key(prefix: &str, collection: &str, id: &str) -> String {
    format!("{prefix}{collection}:{id}")
}

/// Builds the collection metadata hash key `{prefix}collection:{name}` (§6).
#[must_use]
pub fn collection_metadata_key(prefix: &str, name: &str) -> String {
    format!("{prefix}collection:{name}")
}

/// Builds the search index name `{prefix}{collection}:idx` (§6).
#[must_use]
pub fn index_name(prefix: &str, collection: &str) -> String {
    format!("{prefix}{collection}:idx")
}

/// Builds the document-key prefix an index is created over:
/// `{prefix}{collection}:`.
#[must_use]
pub fn document_key_prefix(prefix: &str, collection: &str) -> String {
    format!("{prefix}{collection}:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_boundary_160kib() {
        let ok = "a".repeat(MAX_CONTENT_BYTES);
        let too_big = "a".repeat(MAX_CONTENT_BYTES + 1);
        assert!(Document::validate_content(&ok).is_ok());
        assert!(Document::validate_content(&too_big).is_err());
    }

    #[test]
    fn rejects_reserved_ids() {
        assert!(Document::validate_id("search").is_err());
        assert!(Document::validate_id("collections").is_err());
        assert!(Document::validate_id("a").is_ok());
    }

    #[test]
    fn json_body_roundtrips_tags_and_numerics() {
        let mut tags = HashMap::new();
        tags.insert("lang".to_string(), "en".to_string());
        let mut numerics = HashMap::new();
        numerics.insert("year".to_string(), 2024.0);

        let doc = Document {
            id: "a".to_string(),
            content: "hello".to_string(),
            tags,
            numerics,
            vector: vec![1.0, 0.0, 0.0, 0.0],
            revision: 1,
        };

        let body = doc.to_json_body();
        assert!(body.get(CONTENT_KEY).is_some());
        assert!(body.get("lang").is_some());

        let restored = Document::from_json_body("a", &body).unwrap();
        assert_eq!(restored.content, doc.content);
        assert_eq!(restored.tags, doc.tags);
        assert_eq!(restored.numerics, doc.numerics);
        assert_eq!(restored.vector, doc.vector);
    }

    #[test]
    fn document_key_matches_layout() {
        assert_eq!(document_key("vecdex:", "notes", "a"), "vecdex:notes:a");
        assert_eq!(
            collection_metadata_key("vecdex:", "notes"),
            "vecdex:collection:notes"
        );
        assert_eq!(index_name("vecdex:", "notes"), "vecdex:notes:idx");
    }
}
