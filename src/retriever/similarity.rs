/// L2 norm accumulated in f64.
fn l2_norm(v: &[f32]) -> f64 {
    v.iter().map(|&x| f64::from(x) * f64::from(x)).sum::<f64>().sqrt()
}

/// Unit-length copy of `v`, or `None` for a zero-norm or non-finite vector.
pub fn normalize(v: &[f32]) -> Option<Vec<f64>> {
    let norm = l2_norm(v);
    if !norm.is_finite() || norm <= f64::EPSILON {
        return None;
    }
    let inv = norm.recip();
    Some(v.iter().map(|&x| f64::from(x) * inv).collect())
}

/// Dot product of an already-normalised query with a raw row, normalising the
/// row on the fly. `None` when the row is degenerate or dimensions differ.
pub fn cosine_to_unit(unit_query: &[f64], row: &[f32]) -> Option<f32> {
    if unit_query.len() != row.len() {
        return None;
    }
    let norm = l2_norm(row);
    if !norm.is_finite() || norm <= f64::EPSILON {
        return None;
    }
    let dot: f64 = unit_query
        .iter()
        .zip(row)
        .map(|(&q, &r)| q * f64::from(r))
        .sum();
    Some((dot / norm).clamp(-1.0, 1.0) as f32)
}

/// Cosine similarity between two raw vectors.
#[cfg(test)]
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    let unit = normalize(a)?;
    cosine_to_unit(&unit, b)
}

/// Stable descending sort by score, truncated to `top_k`. Equal scores keep
/// their input order.
pub fn rank<T>(mut scored: Vec<(T, f32)>, top_k: usize) -> Vec<(T, f32)> {
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(top_k);
    scored
}
