//! Vecdex configuration.
//!
//! Layered config via `vecdex.toml`, environment variables, and runtime
//! overrides.
//!
//! # Priority (highest to lowest)
//!
//! 1. Runtime overrides (constructed directly)
//! 2. Environment variables (`VECDEX_*`)
//! 3. Configuration file (`vecdex.toml`)
//! 4. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to parse configuration.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid configuration value.
    #[error("invalid configuration value for '{key}': {message}")]
    InvalidValue {
        /// Key that failed validation.
        key: String,
        /// Validation error message.
        message: String,
    },
}

/// Backend storage driver. Matches the "two backend variants" the
/// `StorageAdapter` facade hides: a single-node deployment and a clustered
/// one of the same Redis-Stack-compatible engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageDriver {
    /// Single-node connection, reconnected transparently via a connection
    /// manager.
    #[default]
    Standalone,
    /// Clustered connection, topology-aware.
    Cluster,
}

/// Storage backend configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Which backend variant to dial.
    pub driver: StorageDriver,
    /// `host:port` addresses. A standalone driver uses only the first.
    pub addrs: Vec<String>,
    /// Optional AUTH password.
    pub password: Option<String>,
    /// Prefix prepended to every key this service writes.
    pub key_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            driver: StorageDriver::Standalone,
            addrs: vec!["127.0.0.1:6379".to_string()],
            password: None,
            key_prefix: "vecdex:".to_string(),
        }
    }
}

/// Vector index parameters applied to every created collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    /// Default embedding dimension, used when a collection's fields don't
    /// otherwise imply one.
    pub default_dimensions: usize,
    /// HNSW `M` parameter (max connections per node).
    pub hnsw_m: usize,
    /// HNSW `efConstruction` parameter.
    pub hnsw_ef_construct: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            default_dimensions: 1024,
            hnsw_m: 32,
            hnsw_ef_construct: 400,
        }
    }
}

/// Pagination defaults and ceilings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PagingConfig {
    /// Page size used when the caller does not specify one.
    pub default_page_size: usize,
    /// Maximum page size a caller may request.
    pub max_page_size: usize,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

/// Batch endpoint limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum number of items accepted by a single batch request.
    pub max_batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { max_batch_size: 100 }
    }
}

/// Instruction prefixes prepended before embedding, per §4.2.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstructionConfig {
    /// Prefix used by the document-embedder pipeline (writes).
    pub document: String,
    /// Prefix used by the query-embedder pipeline (searches).
    pub query: String,
}

impl Default for InstructionConfig {
    fn default() -> Self {
        Self {
            document: "document: ".to_string(),
            query: "query: ".to_string(),
        }
    }
}

/// Embedding provider configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Base URL of the OpenAI-compatible embeddings API.
    pub base_url: String,
    /// Bearer token, if the provider requires one.
    pub api_key: Option<String>,
    /// Model identifier sent in every request.
    pub model: String,
    /// Optional `dimensions` parameter forwarded to the provider.
    pub dimensions: Option<usize>,
    /// Instruction prefixes.
    pub instruction: InstructionConfig,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "text-embedding-3-small".to_string(),
            dimensions: None,
            instruction: InstructionConfig::default(),
        }
    }
}

/// Budget gate action when a period limit is exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetAction {
    /// Log and continue.
    #[default]
    Warn,
    /// Fail fast with `EmbeddingQuotaExceeded` once the limit is crossed.
    Reject,
}

/// Embedding budget configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Daily token limit (`None` = unlimited).
    pub daily_limit: Option<u64>,
    /// Monthly token limit (`None` = unlimited).
    pub monthly_limit: Option<u64>,
    /// Action to take once a limit is exceeded.
    pub action: BudgetAction,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_limit: None,
            monthly_limit: None,
            action: BudgetAction::Warn,
        }
    }
}

/// HTTP server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Acceptable bearer API keys. Empty means auth is disabled.
    pub api_keys: Vec<String>,
    /// Per-request deadline (§5): past this, the in-flight handler is
    /// cancelled and the client gets a `408`.
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            api_keys: Vec::new(),
            request_timeout_ms: 30_000,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `error`, `warn`, `info`, `debug`, or `trace`.
    pub level: String,
    /// `text` or `json`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Main Vecdex configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VecdexConfig {
    /// Storage backend.
    pub storage: StorageConfig,
    /// Vector index defaults.
    pub vectors: VectorConfig,
    /// Pagination defaults.
    pub paging: PagingConfig,
    /// Batch endpoint limits.
    pub batch: BatchConfig,
    /// Embedding provider.
    pub embedding: EmbeddingConfig,
    /// Embedding budget.
    pub budget: BudgetConfig,
    /// HTTP server.
    pub server: ServerConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

impl VecdexConfig {
    /// Loads configuration from `vecdex.toml` plus environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or environment values fail to parse.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("vecdex.toml")
    }

    /// Loads configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or environment values fail to parse.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("VECDEX_").split("__"));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Builds a configuration directly from a TOML string (used in tests).
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml_str));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid field encountered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.addrs.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "storage.addrs".to_string(),
                message: "at least one address is required".to_string(),
            });
        }

        if self.paging.default_page_size == 0 || self.paging.default_page_size > self.paging.max_page_size {
            return Err(ConfigError::InvalidValue {
                key: "paging.default_page_size".to_string(),
                message: format!(
                    "must be in [1, {}]",
                    self.paging.max_page_size
                ),
            });
        }

        if self.paging.max_page_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "paging.max_page_size".to_string(),
                message: "must be > 0".to_string(),
            });
        }

        if self.batch.max_batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "batch.max_batch_size".to_string(),
                message: "must be > 0".to_string(),
            });
        }

        if self.vectors.default_dimensions == 0 {
            return Err(ConfigError::InvalidValue {
                key: "vectors.default_dimensions".to_string(),
                message: "must be > 0".to_string(),
            });
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.level".to_string(),
                message: format!("expected one of {valid_levels:?}"),
            });
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.format".to_string(),
                message: format!("expected one of {valid_formats:?}"),
            });
        }

        Ok(())
    }

    /// Serializes the configuration to TOML (used by `vecdex config dump`-style
    /// tooling and tests).
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = VecdexConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.storage.key_prefix, "vecdex:");
        assert_eq!(cfg.paging.default_page_size, 20);
    }

    #[test]
    fn rejects_empty_addrs() {
        let mut cfg = VecdexConfig::default();
        cfg.storage.addrs.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_oversized_default_page() {
        let mut cfg = VecdexConfig::default();
        cfg.paging.default_page_size = 200;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn from_toml_overrides_defaults() {
        let cfg = VecdexConfig::from_toml(
            r#"
            [storage]
            driver = "cluster"
            addrs = ["node1:6379", "node2:6379"]

            [budget]
            action = "reject"
            daily_limit = 100000
            "#,
        )
        .unwrap();
        assert_eq!(cfg.storage.driver, StorageDriver::Cluster);
        assert_eq!(cfg.storage.addrs.len(), 2);
        assert_eq!(cfg.budget.action, BudgetAction::Reject);
        assert_eq!(cfg.budget.daily_limit, Some(100_000));
    }
}
