//! Vector similarity, rank fusion, and the local hashing embedder.
//!
//! Pure-Rust implementations of:
//! - Cosine similarity and filtered nearest-neighbour ranking
//! - Reciprocal Rank Fusion (RRF) for merging ranked document lists
//! - A deterministic feature-hashing bag-of-words embedder

use async_trait::async_trait;
use inkweave_core::error::StoreError;
use inkweave_core::store::{
    Collection, Embedder, RetrievedDocument, ScoredPoint, SearchOptions, VectorPoint,
};
use std::collections::HashMap;

/// Cosine of the angle between `a` and `b`, accumulated in f64.
///
/// Mismatched lengths, empty input, or a zero vector give 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot, aa, bb) = a.iter().zip(b).fold((0.0f64, 0.0f64, 0.0f64), |(dot, aa, bb), (&x, &y)| {
        let (x, y) = (f64::from(x), f64::from(y));
        (dot + x * y, aa + x * x, bb + y * y)
    });

    let norms = (aa * bb).sqrt();
    if norms < 1e-10 { 0.0 } else { (dot / norms) as f32 }
}

/// Whether every filter matches a top-level payload field.
pub fn payload_matches(payload: &serde_json::Value, options: &SearchOptions) -> bool {
    options
        .filters
        .iter()
        .all(|(k, v)| payload.get(k).is_some_and(|p| p == v))
}

/// Rank points by cosine similarity to `query`, best first.
///
/// Applies payload filters and the score threshold, then truncates to the
/// limit. Ties keep their input order.
pub fn rank_points<'a>(
    points: impl IntoIterator<Item = &'a VectorPoint>,
    query: &[f32],
    options: &SearchOptions,
) -> Vec<ScoredPoint> {
    let min_score = options.score_threshold.unwrap_or(f32::NEG_INFINITY);
    let mut scored: Vec<ScoredPoint> = points
        .into_iter()
        .filter(|p| payload_matches(&p.payload, options))
        .filter_map(|p| {
            let score = cosine_similarity(&p.vector, query);
            (score >= min_score).then(|| ScoredPoint {
                id: p.id.clone(),
                score,
                payload: p.payload.clone(),
            })
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(options.limit);
    scored
}

/// Reciprocal Rank Fusion (RRF): merge two ranked document lists.
///
/// Each document's final score = sum of 1/(k + rank) across both lists.
/// Standard value is k=60. Returns merged results sorted by RRF score,
/// deduplicated by document id.
pub fn reciprocal_rank_fusion(
    semantic: &[RetrievedDocument],
    keyword: &[RetrievedDocument],
    k: u32,
    limit: usize,
) -> Vec<RetrievedDocument> {
    let k = k as f32;
    let mut scores: HashMap<String, (f32, usize, RetrievedDocument)> = HashMap::new();
    let mut seen = 0usize;

    for list in [semantic, keyword] {
        for (rank, doc) in list.iter().enumerate() {
            let rrf_score = 1.0 / (k + rank as f32 + 1.0);
            scores
                .entry(doc.document_id.clone())
                .and_modify(|(score, _, _)| *score += rrf_score)
                .or_insert_with(|| {
                    seen += 1;
                    (rrf_score, seen, doc.clone())
                });
        }
    }

    let mut results: Vec<(f32, usize, RetrievedDocument)> = scores.into_values().collect();
    // Equal scores fall back to first-seen order so output is deterministic.
    results.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.1.cmp(&b.1))
    });
    results.truncate(limit);
    results
        .into_iter()
        .map(|(score, _, mut doc)| {
            doc.score = score;
            doc
        })
        .collect()
}

/// Lowercased alphanumeric tokens (apostrophes kept inside words).
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|w| w.trim_matches('\'').to_lowercase())
        .filter(|w| !w.is_empty())
}

/// 64-bit FNV-1a, stable across platforms and releases.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes.iter().fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}

/// Deterministic bag-of-words embedding via signed feature hashing.
///
/// Each token lands in one bucket with a sign taken from a separate hash
/// bit; the result is L2-normalised. Identical text always yields the
/// identical vector, and texts sharing vocabulary score closer under cosine.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let h = fnv1a(token.as_bytes());
            let bucket = (h % self.dimension as u64) as usize;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(Collection::Content.dimension())
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        Ok(self.embed_text(text))
    }
}
