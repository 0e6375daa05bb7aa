//! Pure vector comparison helpers and brute-force top-K ranking.
//!
//! Every function is degenerate-safe: mismatched or empty inputs produce a
//! sentinel value instead of an error or a division by zero.

use std::cmp::Ordering;

/// A ranked candidate: its position in the input and its similarity score.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoredIndex {
    pub index: usize,
    pub score: f64,
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if the lengths differ, the vectors are empty, or either
/// vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    (dot / (mag_a * mag_b)).clamp(-1.0, 1.0)
}

/// Compute the L2 distance between two vectors.
///
/// Returns `f64::MAX` when the vectors cannot be compared (different or
/// zero lengths).
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return f64::MAX;
    }

    a.iter()
        .zip(b.iter())
        .map(|(x, y)| ((*x as f64) - (*y as f64)).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Scale `v` to unit L2 norm. Empty and all-zero vectors are returned as-is.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| ((*x as f64) / norm) as f32).collect()
}

/// Rank `vectors` against `query` by cosine similarity.
///
/// Keeps candidates scoring at least `threshold`, orders them by descending
/// score with ties broken by ascending input position, and returns at most
/// `k` of them. `k == 0` or an empty corpus yields an empty result.
pub fn top_k_by_similarity<V: AsRef<[f32]>>(
    query: &[f32],
    vectors: &[V],
    k: usize,
    threshold: f64,
) -> Vec<ScoredIndex> {
    if k == 0 || vectors.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<ScoredIndex> = vectors
        .iter()
        .enumerate()
        .map(|(index, v)| ScoredIndex {
            index,
            score: cosine_similarity(query, v.as_ref()),
        })
        .filter(|hit| hit.score >= threshold)
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.index.cmp(&b.index))
    });
    scored.truncate(k);
    scored
}
