//! Collection and field types (§3).

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Matches collection and field names.
pub static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap());

/// Maximum number of user fields a collection may declare.
pub const MAX_FIELDS: usize = 64;

/// Field names a collection schema may never declare — they collide with
/// the document's own reserved attributes.
pub const RESERVED_FIELD_NAMES: [&str; 4] = ["id", "content", "score", "vector"];

/// Whether a collection holds text documents (HNSW + cosine over an
/// embedding vector) or geographic points (FLAT + L2 over an ECEF unit
/// vector).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionType {
    /// Documents embedded from free text via the embedding pipeline.
    Text,
    /// Documents located by latitude/longitude, indexed via ECEF.
    Geo,
}

impl CollectionType {
    /// Parses the persisted metadata-hash string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "geo" => Some(Self::Geo),
            _ => None,
        }
    }

    /// Returns the persisted metadata-hash string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Geo => "geo",
        }
    }
}

/// A user-declared field's filter semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Exact-match and set-membership filtering.
    Tag,
    /// Range filtering (`gt`/`gte`/`lt`/`lte`).
    Numeric,
}

impl FieldType {
    /// Parses the `name:type` persisted form's type token.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tag" => Some(Self::Tag),
            "numeric" => Some(Self::Numeric),
            _ => None,
        }
    }

    /// Returns the persisted token.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tag => "tag",
            Self::Numeric => "numeric",
        }
    }
}

/// A single user-declared field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Field name, matching [`NAME_RE`].
    pub name: String,
    /// Filter semantics.
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl Field {
    /// Validates the field name against the naming rule and the reserved
    /// names list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSchema`] if the name is malformed or reserved.
    pub fn validate(&self) -> Result<()> {
        if !NAME_RE.is_match(&self.name) {
            return Err(Error::InvalidSchema(format!(
                "field name '{}' must match {}",
                self.name,
                NAME_RE.as_str()
            )));
        }
        if RESERVED_FIELD_NAMES.contains(&self.name.as_str()) {
            return Err(Error::InvalidSchema(format!(
                "field name '{}' is reserved",
                self.name
            )));
        }
        Ok(())
    }
}

/// A vector index collection: identified by name, carrying user fields and
/// a declared vector dimension (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    /// Collection name, matching [`NAME_RE`].
    pub name: String,
    /// Text or geo.
    pub collection_type: CollectionType,
    /// Ordered, uniquely-named user fields.
    pub fields: Vec<Field>,
    /// Vector dimension. For geo collections this is always 3 (ECEF).
    pub vector_dim: usize,
    /// Creation timestamp, milliseconds since epoch.
    pub created_at: i64,
    /// Monotonic revision. Starts at 1; this design defines no in-place
    /// schema edit, so it never increments today.
    pub revision: u64,
}

impl Collection {
    /// Builds and validates a new collection. `created_at` is milliseconds
    /// since epoch, supplied by the caller so this stays a pure function.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSchema`] if the name, fields, or dimension
    /// violate §3's invariants.
    pub fn new(
        name: impl Into<String>,
        collection_type: CollectionType,
        fields: Vec<Field>,
        vector_dim: usize,
        created_at: i64,
    ) -> Result<Self> {
        let name = name.into();
        Self::validate_name(&name)?;

        if fields.len() > MAX_FIELDS {
            return Err(Error::InvalidSchema(format!(
                "collection '{name}' declares {} fields, max is {MAX_FIELDS}",
                fields.len()
            )));
        }

        let mut seen = std::collections::HashSet::with_capacity(fields.len());
        for field in &fields {
            field.validate()?;
            if !seen.insert(field.name.as_str()) {
                return Err(Error::InvalidSchema(format!(
                    "duplicate field name '{}'",
                    field.name
                )));
            }
        }

        let vector_dim = match collection_type {
            CollectionType::Geo => 3,
            CollectionType::Text => {
                if vector_dim == 0 {
                    return Err(Error::InvalidSchema(
                        "vector dimension must be positive".to_string(),
                    ));
                }
                vector_dim
            }
        };

        Ok(Self {
            name,
            collection_type,
            fields,
            vector_dim,
            created_at,
            revision: 1,
        })
    }

    /// Validates a collection name against [`NAME_RE`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSchema`] if the name does not match.
    pub fn validate_name(name: &str) -> Result<()> {
        if !NAME_RE.is_match(name) {
            return Err(Error::InvalidSchema(format!(
                "collection name '{name}' must match {}",
                NAME_RE.as_str()
            )));
        }
        Ok(())
    }

    /// Looks up a declared tag field by name.
    #[must_use]
    pub fn tag_field(&self, name: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|f| f.name == name && f.field_type == FieldType::Tag)
    }

    /// Looks up a declared numeric field by name.
    #[must_use]
    pub fn numeric_field(&self, name: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|f| f.name == name && f.field_type == FieldType::Numeric)
    }

    /// Encodes `fields` into the persisted `name:type,name:type` form used
    /// in the metadata hash (§6).
    #[must_use]
    pub fn encode_fields(&self) -> String {
        self.fields
            .iter()
            .map(|f| format!("{}:{}", f.name, f.field_type.as_str()))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Decodes the persisted `name:type,name:type` form back into fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if the stored metadata is malformed —
    /// this indicates storage corruption, not a caller error.
    pub fn decode_fields(encoded: &str) -> Result<Vec<Field>> {
        if encoded.is_empty() {
            return Ok(Vec::new());
        }
        encoded
            .split(',')
            .map(|pair| {
                let (name, type_str) = pair.split_once(':').ok_or_else(|| {
                    Error::Internal(format!("malformed field entry '{pair}' in metadata"))
                })?;
                let field_type = FieldType::parse(type_str).ok_or_else(|| {
                    Error::Internal(format!("unknown field type '{type_str}' in metadata"))
                })?;
                Ok(Field {
                    name: name.to_string(),
                    field_type,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_reserved_field_name() {
        let field = Field {
            name: "content".to_string(),
            field_type: FieldType::Tag,
        };
        assert!(field.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_fields() {
        let fields = vec![
            Field {
                name: "lang".to_string(),
                field_type: FieldType::Tag,
            },
            Field {
                name: "lang".to_string(),
                field_type: FieldType::Numeric,
            },
        ];
        let err = Collection::new("notes", CollectionType::Text, fields, 4, 0).unwrap_err();
        assert_eq!(err.code(), "invalid_schema");
    }

    #[test]
    fn geo_collection_forces_dim_3() {
        let c = Collection::new("places", CollectionType::Geo, vec![], 999, 0).unwrap();
        assert_eq!(c.vector_dim, 3);
    }

    #[test]
    fn name_boundaries_around_64_chars() {
        let ok = "a".repeat(64);
        let too_long = "a".repeat(65);
        assert!(Collection::validate_name(&ok).is_ok());
        assert!(Collection::validate_name(&too_long).is_err());
    }

    #[test]
    fn fields_roundtrip_through_encoding() {
        let fields = vec![
            Field {
                name: "lang".to_string(),
                field_type: FieldType::Tag,
            },
            Field {
                name: "year".to_string(),
                field_type: FieldType::Numeric,
            },
        ];
        let c = Collection::new("notes", CollectionType::Text, fields.clone(), 4, 0).unwrap();
        let encoded = c.encode_fields();
        let decoded = Collection::decode_fields(&encoded).unwrap();
        assert_eq!(decoded, fields);
    }

    #[test]
    fn rejects_too_many_fields() {
        let fields: Vec<Field> = (0..=MAX_FIELDS)
            .map(|i| Field {
                name: format!("f{i}"),
                field_type: FieldType::Tag,
            })
            .collect();
        assert!(Collection::new("notes", CollectionType::Text, fields, 4, 0).is_err());
    }
}
