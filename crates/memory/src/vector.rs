//! Vector similarity over multi-model embeddings.

use iris_core::memory::{Memory, VectorMap};

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if the lengths differ or either vector is empty or zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Mean cosine similarity over the embedding models both maps contain.
/// `None` when they share no model.
pub fn multi_vector_similarity(a: &VectorMap, b: &VectorMap) -> Option<f32> {
    let scores: Vec<f32> = a
        .iter()
        .filter_map(|(model, va)| b.get(model).map(|vb| cosine_similarity(va, vb)))
        .collect();
    if scores.is_empty() {
        return None;
    }
    Some(scores.iter().sum::<f32>() / scores.len() as f32)
}

/// Rank non-deleted memories by similarity to `query`, best first.
pub fn rank_memories<'a>(
    memories: impl IntoIterator<Item = &'a Memory>,
    query: &VectorMap,
    limit: usize,
) -> Vec<Memory> {
    let mut scored: Vec<(f32, &Memory)> = memories
        .into_iter()
        .filter(|m| !m.deleted)
        .filter_map(|m| multi_vector_similarity(&m.vectors, query).map(|s| (s, m)))
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored.into_iter().map(|(_, m)| m.clone()).collect()
}
