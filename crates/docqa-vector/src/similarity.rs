use docqa_core::error::{Error, Result};

/// Cosine similarity in [-1, 1], accumulated in f64.
///
/// Returns 0 when either vector has zero magnitude. Callers must pass
/// vectors of equal length; see [`score`].
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut mag_a, mut mag_b) = (0f64, 0f64, 0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    (dot / (mag_a.sqrt() * mag_b.sqrt())) as f32
}

/// Similarity of a stored vector to the query, or `DimensionMismatch` when
/// their lengths differ.
pub fn score(query: &[f32], stored: &[f32]) -> Result<f32> {
    if query.len() != stored.len() {
        return Err(Error::DimensionMismatch { expected: query.len(), actual: stored.len() });
    }
    Ok(cosine_similarity(query, stored))
}
