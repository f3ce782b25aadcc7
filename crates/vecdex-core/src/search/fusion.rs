//! Reciprocal Rank Fusion over two ranked result lists (§4.5).

use crate::storage::ScoredDoc;
use std::collections::HashMap;

/// RRF damping constant.
const RRF_K: f64 = 60.0;

/// One document after fusion: summed RRF score plus the payload carried
/// over from whichever side returned it (KNN preferred).
#[derive(Debug, Clone)]
pub struct FusedDoc {
    /// Storage key of the fused document.
    pub key: String,
    /// Summed reciprocal-rank score.
    pub score: f64,
    /// JSON body, if either side returned one.
    pub payload: Option<serde_json::Value>,
}

/// Fuses a KNN list and a BM25 list by Reciprocal Rank Fusion: every item at
/// 0-based rank `r` in a list contributes `1/(K+r+1)`, K=60. Items merge by
/// key with scores summed, output sorted by fused score descending with a
/// lexicographic tie-break on key (§4.5, §5 "stable for equal scores").
#[must_use]
pub fn reciprocal_rank_fusion(knn: &[ScoredDoc], bm25: &[ScoredDoc]) -> Vec<FusedDoc> {
    let mut merged: HashMap<String, FusedDoc> = HashMap::new();

    for list in [knn, bm25] {
        for (rank, doc) in list.iter().enumerate() {
            let contribution = 1.0 / (RRF_K + rank as f64 + 1.0);
            let entry = merged.entry(doc.key.clone()).or_insert_with(|| FusedDoc {
                key: doc.key.clone(),
                score: 0.0,
                payload: None,
            });
            entry.score += contribution;
            if entry.payload.is_none() {
                entry.payload = doc.payload.clone();
            }
        }
    }

    let mut out: Vec<FusedDoc> = merged.into_values().collect();
    out.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.key.cmp(&b.key))
    });
    out
}
