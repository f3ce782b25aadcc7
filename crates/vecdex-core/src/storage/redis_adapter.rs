//! [`StorageAdapter`] implementation backed by the `redis` crate, speaking
//! to either a standalone node or a cluster (§4.1's two backend variants).
//!
//! Every command is built by hand with `redis::cmd` rather than the typed
//! command traits: `FT.*` and `JSON.*` are engine modules with no typed
//! wrapper in `redis-rs`, and building every command the same way keeps the
//! error-translation path (engine string -> stable [`Error`] variant) in one
//! place instead of split across typed and raw call sites.

use super::{
    Bm25Request, IndexField, IndexFieldType, IndexSchema, KnnRequest, ListRequest, ScoredDoc,
    StorageAdapter, StorageKind, VectorAlgo,
};
use crate::config::{StorageConfig, StorageDriver};
use crate::error::{Error, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::cluster::ClusterClient;
use redis::cluster_async::ClusterConnection;
use redis::{Cmd, FromRedisValue, RedisError, Value};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

enum Conn {
    Standalone(ConnectionManager),
    Cluster(ClusterConnection),
}

impl Clone for Conn {
    fn clone(&self) -> Self {
        match self {
            Self::Standalone(mgr) => Self::Standalone(mgr.clone()),
            Self::Cluster(conn) => Self::Cluster(conn.clone()),
        }
    }
}

/// A [`StorageAdapter`] speaking to a Redis-Stack-compatible engine.
pub struct RedisAdapter {
    conn: Conn,
    supports_bm25: bool,
}

fn build_url(addr: &str, password: Option<&str>) -> String {
    match password {
        Some(p) if !p.is_empty() => format!("redis://:{p}@{addr}"),
        _ => format!("redis://{addr}"),
    }
}

fn map_connect_err(e: RedisError) -> Error {
    Error::Internal(format!("storage backend connection failed: {e}"))
}

impl RedisAdapter {
    /// Connects per `config.driver`: a single-node client with a
    /// reconnecting [`ConnectionManager`] for [`StorageDriver::Standalone`],
    /// or a cluster-aware connection for [`StorageDriver::Cluster`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if the initial connection fails.
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        if config.addrs.is_empty() {
            return Err(Error::InvalidSchema(
                "storage.addrs must not be empty".to_string(),
            ));
        }
        let conn = match config.driver {
            StorageDriver::Standalone => {
                let url = build_url(&config.addrs[0], config.password.as_deref());
                let client = redis::Client::open(url).map_err(map_connect_err)?;
                let mgr = ConnectionManager::new(client)
                    .await
                    .map_err(map_connect_err)?;
                Conn::Standalone(mgr)
            }
            StorageDriver::Cluster => {
                let urls: Vec<String> = config
                    .addrs
                    .iter()
                    .map(|a| build_url(a, config.password.as_deref()))
                    .collect();
                let client = ClusterClient::new(urls).map_err(map_connect_err)?;
                let conn = client
                    .get_async_connection()
                    .await
                    .map_err(map_connect_err)?;
                Conn::Cluster(conn)
            }
        };
        let supports_bm25 = probe_bm25_support(&conn).await;
        Ok(Self {
            conn,
            supports_bm25,
        })
    }

    async fn raw_query<T: FromRedisValue>(&self, cmd: &mut Cmd) -> std::result::Result<T, RedisError> {
        match &self.conn {
            Conn::Standalone(mgr) => {
                let mut mgr = mgr.clone();
                cmd.query_async(&mut mgr).await
            }
            Conn::Cluster(conn) => {
                let mut conn = conn.clone();
                cmd.query_async(&mut conn).await
            }
        }
    }

    async fn query<T: FromRedisValue>(&self, cmd: &mut Cmd) -> Result<T> {
        self.raw_query(cmd)
            .await
            .map_err(|e| Error::Internal(e.to_string()))
    }
}

async fn probe_bm25_support(conn: &Conn) -> bool {
    let mut cmd = redis::cmd("FT._LIST");
    let result: std::result::Result<Vec<String>, RedisError> = match conn {
        Conn::Standalone(mgr) => {
            let mut mgr = mgr.clone();
            cmd.query_async(&mut mgr).await
        }
        Conn::Cluster(c) => {
            let mut c = c.clone();
            cmd.query_async(&mut c).await
        }
    };
    result.is_ok()
}

fn value_as_bytes(v: &Value) -> Option<Vec<u8>> {
    match v {
        Value::BulkString(b) => Some(b.clone()),
        Value::SimpleString(s) => Some(s.clone().into_bytes()),
        Value::Okay => Some(b"OK".to_vec()),
        Value::Int(n) => Some(n.to_string().into_bytes()),
        _ => None,
    }
}

fn value_as_str(v: &Value) -> Option<String> {
    value_as_bytes(v).and_then(|b| String::from_utf8(b).ok())
}

fn value_as_array(v: &Value) -> Option<&[Value]> {
    match v {
        Value::Array(a) => Some(a.as_slice()),
        _ => None,
    }
}

fn fields_to_map(fields: &[Value]) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let mut iter = fields.iter();
    while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
        if let (Some(k), Some(v)) = (value_as_str(k), value_as_str(v)) {
            map.insert(k, v);
        }
    }
    map
}

/// Parses an `FT.SEARCH` reply without `WITHSCORES`: `[n, key, [fields], ...]`.
/// Used for KNN (score read out of a named field) and plain listing (no
/// score).
fn parse_fields_reply(value: Value, score_field: Option<&str>, raw_scores: bool) -> Result<Vec<ScoredDoc>> {
    let arr = value_as_array(&value)
        .ok_or_else(|| Error::Internal("unexpected FT.SEARCH reply shape".to_string()))?;
    let mut out = Vec::new();
    let mut i = 1;
    while i + 1 < arr.len() {
        let key = value_as_str(&arr[i])
            .ok_or_else(|| Error::Internal("missing key in FT.SEARCH reply".to_string()))?;
        let fields = value_as_array(&arr[i + 1]).unwrap_or(&[]);
        let map = fields_to_map(fields);
        let score = match score_field {
            Some(field) => {
                let distance: f32 = map.get(field).and_then(|s| s.parse().ok()).unwrap_or(0.0);
                if raw_scores {
                    distance
                } else {
                    (1.0 - distance).max(0.0)
                }
            }
            None => 0.0,
        };
        let payload = map.get("$").and_then(|s| serde_json::from_str(s).ok());
        out.push(ScoredDoc { key, score, payload });
        i += 2;
    }
    Ok(out)
}

/// Parses an `FT.SEARCH ... WITHSCORES` reply: `[n, key, score, [fields], ...]`.
fn parse_withscores_reply(value: Value) -> Result<Vec<ScoredDoc>> {
    let arr = value_as_array(&value)
        .ok_or_else(|| Error::Internal("unexpected FT.SEARCH reply shape".to_string()))?;
    let mut out = Vec::new();
    let mut i = 1;
    while i + 2 < arr.len() {
        let key = value_as_str(&arr[i])
            .ok_or_else(|| Error::Internal("missing key in FT.SEARCH reply".to_string()))?;
        let score: f32 = value_as_str(&arr[i + 1])
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0);
        let fields = value_as_array(&arr[i + 2]).unwrap_or(&[]);
        let map = fields_to_map(fields);
        let payload = map.get("$").and_then(|s| serde_json::from_str(s).ok());
        out.push(ScoredDoc { key, score, payload });
        i += 3;
    }
    Ok(out)
}

fn append_field(cmd: &mut Cmd, field: &IndexField) {
    cmd.arg(&field.name);
    if let Some(alias) = &field.alias {
        cmd.arg("AS").arg(alias);
    }
    match field.field_type {
        IndexFieldType::Numeric => {
            cmd.arg("NUMERIC");
        }
        IndexFieldType::Tag => {
            cmd.arg("TAG");
        }
        IndexFieldType::Text => {
            cmd.arg("TEXT");
        }
        IndexFieldType::Vector => {
            let opts = field
                .vector
                .as_ref()
                .expect("vector index field must carry VectorFieldOptions");
            let algo = match opts.algo {
                VectorAlgo::Hnsw => "HNSW",
                VectorAlgo::Flat => "FLAT",
            };
            let metric = match opts.metric {
                super::VectorMetric::L2 => "L2",
                super::VectorMetric::Ip => "IP",
                super::VectorMetric::Cosine => "COSINE",
            };
            let mut attrs: Vec<(&str, String)> = vec![
                ("TYPE", "FLOAT32".to_string()),
                ("DIM", opts.dim.to_string()),
                ("DISTANCE_METRIC", metric.to_string()),
            ];
            match opts.algo {
                VectorAlgo::Hnsw => {
                    attrs.push(("M", opts.m.to_string()));
                    attrs.push(("EF_CONSTRUCTION", opts.ef_construct.to_string()));
                }
                VectorAlgo::Flat => {
                    attrs.push(("BLOCK_SIZE", opts.block_size.to_string()));
                }
            }
            cmd.arg("VECTOR").arg(algo).arg((attrs.len() * 2).to_string());
            for (k, v) in attrs {
                cmd.arg(k).arg(v);
            }
        }
    }
}

#[async_trait]
impl StorageAdapter for RedisAdapter {
    async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for (field, value) in fields {
            cmd.arg(field).arg(value);
        }
        let _: i64 = self.query(&mut cmd).await?;
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut cmd = redis::cmd("HGETALL");
        cmd.arg(key);
        self.query(&mut cmd).await
    }

    async fn hgetall_multi(&self, keys: &[String]) -> Result<Vec<HashMap<String, String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("HGETALL").arg(key);
        }
        let result = match &self.conn {
            Conn::Standalone(mgr) => {
                let mut mgr = mgr.clone();
                pipe.query_async(&mut mgr).await
            }
            Conn::Cluster(conn) => {
                let mut conn = conn.clone();
                pipe.query_async(&mut conn).await
            }
        };
        result.map_err(|e| Error::Internal(e.to_string()))
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        let pattern = format!("{prefix}*");
        loop {
            let mut cmd = redis::cmd("SCAN");
            cmd.arg(cursor).arg("MATCH").arg(&pattern).arg("COUNT").arg(500);
            let (next_cursor, mut batch): (u64, Vec<String>) = self.query(&mut cmd).await?;
            keys.append(&mut batch);
            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }
        Ok(keys)
    }

    async fn json_set(&self, key: &str, path: &str, value: &JsonValue) -> Result<()> {
        let body = serde_json::to_string(value).map_err(|e| Error::Internal(e.to_string()))?;
        let mut cmd = redis::cmd("JSON.SET");
        cmd.arg(key).arg(path).arg(body);
        let _: String = self.query(&mut cmd).await?;
        Ok(())
    }

    async fn json_set_multi(&self, entries: &[(String, JsonValue)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        for (key, value) in entries {
            let body = serde_json::to_string(value).map_err(|e| Error::Internal(e.to_string()))?;
            pipe.cmd("JSON.SET").arg(key).arg("$").arg(body);
        }
        let result: std::result::Result<Vec<String>, _> = match &self.conn {
            Conn::Standalone(mgr) => {
                let mut mgr = mgr.clone();
                pipe.query_async(&mut mgr).await
            }
            Conn::Cluster(conn) => {
                let mut conn = conn.clone();
                pipe.query_async(&mut conn).await
            }
        };
        result.map(|_| ()).map_err(|e| Error::Internal(e.to_string()))
    }

    async fn json_get(&self, key: &str, path: &str) -> Result<Option<JsonValue>> {
        let mut cmd = redis::cmd("JSON.GET");
        cmd.arg(key).arg(path);
        match self.raw_query::<Option<String>>(&mut cmd).await {
            Ok(None) => Ok(None),
            Ok(Some(s)) => {
                let value: JsonValue =
                    serde_json::from_str(&s).map_err(|e| Error::Internal(e.to_string()))?;
                if path == "$" {
                    if let JsonValue::Array(mut arr) = value {
                        return Ok(arr.pop());
                    }
                }
                Ok(Some(value))
            }
            Err(e) => {
                let msg = e.to_string().to_lowercase();
                if msg.contains("does not exist") || msg.contains("no such key") {
                    Ok(None)
                } else {
                    Err(Error::Internal(e.to_string()))
                }
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.query(&mut cmd).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        let _: String = self.query(&mut cmd).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        let _: i64 = self.query(&mut cmd).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(key);
        let n: i64 = self.query(&mut cmd).await?;
        Ok(n > 0)
    }

    async fn incrby(&self, key: &str, by: i64) -> Result<i64> {
        let mut cmd = redis::cmd("INCRBY");
        cmd.arg(key).arg(by);
        self.query(&mut cmd).await
    }

    async fn expire_nx(&self, key: &str, ttl_secs: u64) -> Result<()> {
        let mut cmd = redis::cmd("EXPIRE");
        cmd.arg(key).arg(ttl_secs).arg("NX");
        let _: i64 = self.query(&mut cmd).await?;
        Ok(())
    }

    async fn create_index(&self, schema: &IndexSchema) -> Result<()> {
        let mut cmd = redis::cmd("FT.CREATE");
        cmd.arg(&schema.name);
        cmd.arg("ON").arg(match schema.storage {
            StorageKind::Hash => "HASH",
            StorageKind::Json => "JSON",
        });
        cmd.arg("PREFIX").arg(1).arg(&schema.key_prefix);
        cmd.arg("SCHEMA");
        for field in &schema.fields {
            append_field(&mut cmd, field);
        }
        match self.raw_query::<String>(&mut cmd).await {
            Ok(_) => Ok(()),
            Err(e) => {
                let msg = e.to_string().to_lowercase();
                if msg.contains("already exists") {
                    Err(Error::AlreadyExists(schema.name.clone()))
                } else {
                    Err(Error::Internal(e.to_string()))
                }
            }
        }
    }

    async fn drop_index(&self, name: &str) -> Result<()> {
        let mut cmd = redis::cmd("FT.DROPINDEX");
        cmd.arg(name);
        match self.raw_query::<String>(&mut cmd).await {
            Ok(_) => Ok(()),
            Err(e) => {
                let msg = e.to_string().to_lowercase();
                if msg.contains("unknown index") || msg.contains("no such index") {
                    Err(Error::NotFound(name.to_string()))
                } else {
                    Err(Error::Internal(e.to_string()))
                }
            }
        }
    }

    async fn index_exists(&self, name: &str) -> Result<bool> {
        let mut cmd = redis::cmd("FT.INFO");
        cmd.arg(name);
        match self.raw_query::<Value>(&mut cmd).await {
            Ok(_) => Ok(true),
            Err(e) => {
                let msg = e.to_string().to_lowercase();
                if msg.contains("unknown index") || msg.contains("no such index") {
                    Ok(false)
                } else {
                    Err(Error::Internal(e.to_string()))
                }
            }
        }
    }

    fn supports_bm25(&self) -> bool {
        self.supports_bm25
    }

    async fn knn(&self, req: KnnRequest) -> Result<Vec<ScoredDoc>> {
        let query = super::filter::compile_knn_query(&req.filters, req.k);
        let blob = super::vector_to_le_bytes(&req.vector);
        let mut return_fields = req.return_fields.clone();
        if !return_fields.iter().any(|f| f == "__vector_score") {
            return_fields.push("__vector_score".to_string());
        }
        let mut cmd = redis::cmd("FT.SEARCH");
        cmd.arg(&req.index).arg(&query);
        cmd.arg("PARAMS").arg(2).arg("BLOB").arg(blob);
        cmd.arg("SORTBY").arg("__vector_score");
        cmd.arg("RETURN").arg(return_fields.len()).arg(&return_fields);
        cmd.arg("LIMIT").arg(0).arg(req.k);
        cmd.arg("DIALECT").arg(2);
        let value: Value = self.query(&mut cmd).await?;
        parse_fields_reply(value, Some("__vector_score"), req.raw_scores)
    }

    async fn bm25(&self, req: Bm25Request) -> Result<Vec<ScoredDoc>> {
        if !self.supports_bm25 {
            return Err(Error::KeywordSearchNotSupported);
        }
        let query = super::filter::compile_bm25_query(&req.filters, &req.query);
        let mut cmd = redis::cmd("FT.SEARCH");
        cmd.arg(&req.index).arg(&query);
        cmd.arg("WITHSCORES");
        cmd.arg("RETURN").arg(req.return_fields.len()).arg(&req.return_fields);
        cmd.arg("LIMIT").arg(0).arg(req.top_k);
        cmd.arg("DIALECT").arg(2);
        let value: Value = self.query(&mut cmd).await?;
        parse_withscores_reply(value)
    }

    async fn list(&self, req: ListRequest) -> Result<Vec<ScoredDoc>> {
        let mut cmd = redis::cmd("FT.SEARCH");
        cmd.arg(&req.index).arg("*");
        cmd.arg("RETURN").arg(1).arg("$");
        cmd.arg("LIMIT").arg(req.offset).arg(req.limit);
        cmd.arg("DIALECT").arg(2);
        let value: Value = self.query(&mut cmd).await?;
        parse_fields_reply(value, None, false)
    }

    async fn count(&self, index: &str) -> Result<usize> {
        let mut cmd = redis::cmd("FT.SEARCH");
        cmd.arg(index).arg("*").arg("LIMIT").arg(0).arg(0);
        let value: Value = self.query(&mut cmd).await?;
        let arr = value_as_array(&value)
            .ok_or_else(|| Error::Internal("unexpected FT.SEARCH reply shape".to_string()))?;
        let n = arr
            .first()
            .and_then(|v| if let Value::Int(n) = v { Some(*n as usize) } else { None })
            .unwrap_or(0);
        Ok(n)
    }
}
