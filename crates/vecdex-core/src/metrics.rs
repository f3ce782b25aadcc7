//! Process metric collectors, rendered as Prometheus text exposition format
//! (§4.2 "Instrumented", §6 `/metrics`).
//!
//! There is no global mutable state here: a [`Metrics`] instance is created
//! once at process start and passed explicitly into whatever needs to
//! record against it (§9 "Global state").

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::embedding::cache::CacheEvent;

/// Process-wide counters and a latency histogram sum/count pair. Cheap to
/// clone via `Arc`; every field is independently atomic or lock-guarded.
#[derive(Default)]
pub struct Metrics {
    embedding_requests_total: AtomicU64,
    embedding_tokens_total: AtomicU64,
    embedding_latency_ms_sum: AtomicU64,
    embedding_latency_count: AtomicU64,
    embedding_cache_hits_total: AtomicU64,
    embedding_cache_misses_total: AtomicU64,
    embedding_errors_by_code: Mutex<HashMap<String, u64>>,
    http_requests_by_status: Mutex<HashMap<u16, u64>>,
    storage_requests_total: AtomicU64,
}

impl Metrics {
    /// Records a completed embedding call: latency and billed tokens.
    pub fn record_embedding_request(&self, latency_ms: u64, tokens: u64) {
        self.embedding_requests_total.fetch_add(1, Ordering::Relaxed);
        self.embedding_tokens_total
            .fetch_add(tokens, Ordering::Relaxed);
        self.embedding_latency_ms_sum
            .fetch_add(latency_ms, Ordering::Relaxed);
        self.embedding_latency_count
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Records an embedding failure, keyed by [`crate::Error::code`].
    pub fn record_embedding_error(&self, code: &str) {
        *self
            .embedding_errors_by_code
            .lock()
            .entry(code.to_string())
            .or_insert(0) += 1;
    }

    /// Records a cache hit/miss, as published by the [`Cache`](crate::embedding::cache::Cache) decorator.
    pub fn record_cache_event(&self, event: CacheEvent) {
        match event {
            CacheEvent::Hit => self.embedding_cache_hits_total.fetch_add(1, Ordering::Relaxed),
            CacheEvent::Miss => self
                .embedding_cache_misses_total
                .fetch_add(1, Ordering::Relaxed),
        };
    }

    /// Records one HTTP response by status code.
    pub fn record_http_response(&self, status: u16) {
        *self.http_requests_by_status.lock().entry(status).or_insert(0) += 1;
    }

    /// Records one storage-adapter round trip.
    pub fn record_storage_request(&self) {
        self.storage_requests_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Total embedding pipeline calls since process start (§4.7 "total"
    /// period; there is no persisted all-time counter, so the total report
    /// reads this in-process figure).
    #[must_use]
    pub fn embedding_requests_total(&self) -> u64 {
        self.embedding_requests_total.load(Ordering::Relaxed)
    }

    /// Total tokens billed since process start.
    #[must_use]
    pub fn embedding_tokens_total(&self) -> u64 {
        self.embedding_tokens_total.load(Ordering::Relaxed)
    }

    /// Renders every counter in Prometheus text exposition format.
    #[must_use]
    pub fn render_prometheus(&self) -> String {
        let mut out = String::new();

        out.push_str("# HELP vecdex_embedding_requests_total Total embedding pipeline calls.\n");
        out.push_str("# TYPE vecdex_embedding_requests_total counter\n");
        out.push_str(&format!(
            "vecdex_embedding_requests_total {}\n",
            self.embedding_requests_total.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP vecdex_embedding_tokens_total Total tokens billed by the embedding provider.\n");
        out.push_str("# TYPE vecdex_embedding_tokens_total counter\n");
        out.push_str(&format!(
            "vecdex_embedding_tokens_total {}\n",
            self.embedding_tokens_total.load(Ordering::Relaxed)
        ));

        let count = self.embedding_latency_count.load(Ordering::Relaxed);
        let sum = self.embedding_latency_ms_sum.load(Ordering::Relaxed);
        out.push_str("# HELP vecdex_embedding_latency_ms Embedding pipeline call latency.\n");
        out.push_str("# TYPE vecdex_embedding_latency_ms summary\n");
        out.push_str(&format!("vecdex_embedding_latency_ms_sum {sum}\n"));
        out.push_str(&format!("vecdex_embedding_latency_ms_count {count}\n"));

        out.push_str("# HELP vecdex_embedding_cache_hits_total Embedding cache hits.\n");
        out.push_str("# TYPE vecdex_embedding_cache_hits_total counter\n");
        out.push_str(&format!(
            "vecdex_embedding_cache_hits_total {}\n",
            self.embedding_cache_hits_total.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP vecdex_embedding_cache_misses_total Embedding cache misses.\n");
        out.push_str("# TYPE vecdex_embedding_cache_misses_total counter\n");
        out.push_str(&format!(
            "vecdex_embedding_cache_misses_total {}\n",
            self.embedding_cache_misses_total.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP vecdex_embedding_errors_total Embedding pipeline errors by code.\n");
        out.push_str("# TYPE vecdex_embedding_errors_total counter\n");
        for (code, count) in self.embedding_errors_by_code.lock().iter() {
            out.push_str(&format!(
                "vecdex_embedding_errors_total{{code=\"{code}\"}} {count}\n"
            ));
        }

        out.push_str("# HELP vecdex_http_responses_total HTTP responses by status code.\n");
        out.push_str("# TYPE vecdex_http_responses_total counter\n");
        for (status, count) in self.http_requests_by_status.lock().iter() {
            out.push_str(&format!(
                "vecdex_http_responses_total{{status=\"{status}\"}} {count}\n"
            ));
        }

        out.push_str("# HELP vecdex_storage_requests_total Total storage adapter round trips.\n");
        out.push_str("# TYPE vecdex_storage_requests_total counter\n");
        out.push_str(&format!(
            "vecdex_storage_requests_total {}\n",
            self.storage_requests_total.load(Ordering::Relaxed)
        ));

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_counters_after_recording() {
        let metrics = Metrics::default();
        metrics.record_embedding_request(12, 8);
        metrics.record_cache_event(CacheEvent::Hit);
        metrics.record_embedding_error("rate_limited");
        metrics.record_http_response(200);

        let text = metrics.render_prometheus();
        assert!(text.contains("vecdex_embedding_requests_total 1"));
        assert!(text.contains("vecdex_embedding_tokens_total 8"));
        assert!(text.contains("vecdex_embedding_cache_hits_total 1"));
        assert!(text.contains(r#"vecdex_embedding_errors_total{code="rate_limited"} 1"#));
        assert!(text.contains(r#"vecdex_http_responses_total{status="200"} 1"#));
    }
}
