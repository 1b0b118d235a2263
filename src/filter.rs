//! Feature filtering: gather tier sub-vectors, scatter reconstructions.
//!
//! A feature set is an ordered list of feature indices. Every consumer
//! (quantizer training, encoding, query-time scoring) iterates the set in
//! the same stored order, which fixes the sub-vector layout for the
//! lifetime of a trained index.

/// Extract the selected features of `n` row-major vectors of width `d`.
///
/// Output has `features.len()` columns in feature-set order.
pub fn gather(n: usize, d: usize, x: &[f32], features: &[usize]) -> Vec<f32> {
    let mut out = Vec::with_capacity(n * features.len());
    for row in x.chunks_exact(d).take(n) {
        for &f in features {
            out.push(row[f]);
        }
    }
    out
}

/// Extract the selected features of a single row into `out`.
pub fn gather_row(row: &[f32], features: &[usize], out: &mut [f32]) {
    debug_assert_eq!(out.len(), features.len());
    for (slot, &f) in out.iter_mut().zip(features) {
        *slot = row[f];
    }
}

/// Write a sub-vector back into a full-width row at the positions named by
/// the feature set. Positions outside any feature set are left untouched
/// (callers zero-initialize the row).
pub fn scatter_row(sub: &[f32], features: &[usize], out: &mut [f32]) {
    debug_assert_eq!(sub.len(), features.len());
    for (&v, &f) in sub.iter().zip(features) {
        out[f] = v;
    }
}
