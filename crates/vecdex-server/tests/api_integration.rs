//! Integration tests for the Vecdex REST API: the bearer-token gate, the
//! error-code mapping, and a Geo-collection handler round trip. Geo is used
//! throughout rather than Text so no test ever has to reach the real
//! network-bound embedder `VecdexService::build` always wires in.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;
use vecdex_core::storage::{Bm25Request, IndexSchema, KnnRequest, ListRequest, ScoredDoc, StorageAdapter};
use vecdex_core::{Error, Result, VecdexConfig, VecdexService};
use vecdex_server::{build_router, AppState};

/// A purely in-memory storage double, mirroring `vecdex-core`'s own
/// end-to-end test fake.
#[derive(Default)]
struct FakeStorage {
    hashes: Mutex<HashMap<String, HashMap<String, String>>>,
    json: Mutex<HashMap<String, Value>>,
    kv: Mutex<HashMap<String, String>>,
    indexes: Mutex<HashMap<String, IndexSchema>>,
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

    async fn knn(&self, _req: KnnRequest) -> Result<Vec<ScoredDoc>> {
        Ok(Vec::new())
    }

    async fn bm25(&self, _req: Bm25Request) -> Result<Vec<ScoredDoc>> {
        Ok(Vec::new())
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

fn test_app(api_keys: Vec<String>) -> axum::Router {
    let mut config = VecdexConfig::default();
    config.storage.key_prefix = "vecdex:".to_string();
    config.server.api_keys = api_keys;
    let storage: Arc<dyn StorageAdapter> = Arc::new(FakeStorage::default());
    let service = Arc::new(VecdexService::build(config.clone(), storage).unwrap());
    let state = Arc::new(AppState::new(service, &config));
    build_router(state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_check_is_exempt_from_auth() {
    let app = test_app(vec!["secret".to_string()]);
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn missing_bearer_token_is_rejected() {
    let app = test_app(vec!["secret".to_string()]);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/collections")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], "unauthorized");
}

#[tokio::test]
async fn invalid_bearer_token_is_rejected() {
    let app = test_app(vec!["secret".to_string()]);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/collections")
                .header("Authorization", "Bearer wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn valid_bearer_token_passes_through() {
    let app = test_app(vec!["secret".to_string()]);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/collections")
                .header("Authorization", "Bearer secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_collection_maps_to_404_with_stable_code() {
    let app = test_app(Vec::new());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/collections/missing")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["code"], "collection_not_found");
}

#[tokio::test]
async fn create_and_get_geo_collection_round_trips() {
    let app = test_app(Vec::new());

    let create = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/collections")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({"name": "places", "type": "geo"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(create.status(), StatusCode::CREATED);
    let created = body_json(create).await;
    assert_eq!(created["name"], "places");
    assert_eq!(created["type"], "geo");
    assert_eq!(created["vectorDim"], 3);

    let get = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/collections/places")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(get.status(), StatusCode::OK);
    let fetched = body_json(get).await;
    assert_eq!(fetched["name"], "places");
}

#[tokio::test]
async fn duplicate_geo_collection_maps_to_409() {
    let app = test_app(Vec::new());
    let body = || Body::from(json!({"name": "dup", "type": "geo"}).to_string());
    let req = |b| {
        Request::builder()
            .method("POST")
            .uri("/api/v1/collections")
            .header("Content-Type", "application/json")
            .body(b)
            .unwrap()
    };

    let first = app.clone().oneshot(req(body())).await.unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = app.oneshot(req(body())).await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let body = body_json(second).await;
    assert_eq!(body["code"], "already_exists");
}
