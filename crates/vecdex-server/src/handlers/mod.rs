//! HTTP handlers, one module per resource (§6).

pub mod batch;
pub mod collections;
pub mod documents;
pub mod health;
pub mod search;
pub mod usage;

pub use batch::{batch_delete, batch_upsert};
pub use collections::{create_collection, delete_collection, get_collection, list_collections};
pub use documents::{delete_document, get_document, list_documents, patch_document, upsert_document};
pub use health::{health_check, metrics};
pub use search::search;
pub use usage::get_usage;
