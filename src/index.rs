//! The common index interface shared by the flat and IVF variants.

use crate::error::Result;

/// Sentinel label for "no result" slots in a padded search output.
pub const NO_RESULT: i64 = -1;

/// Result of a batched search: `k` slots per query, row-major, ranked by
/// descending fused score. Slots beyond the available matches hold the
/// sentinel pair (`NO_RESULT`, `f32::NEG_INFINITY`).
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub distances: Vec<f32>,
    pub labels: Vec<i64>,
}

impl SearchResult {
    pub(crate) fn sentinel_filled(n: usize, k: usize) -> Self {
        Self {
            distances: vec![f32::NEG_INFINITY; n * k],
            labels: vec![NO_RESULT; n * k],
        }
    }
}

/// Capability interface for the hybrid index variants.
///
/// Both variants implement this directly; the hybrid codec is an owned
/// component of each, not a shared base. All vectors are fixed-width
/// row-major `f32` slices of length `n * d`. Labels are 0-based insertion
/// order integers comparable across tiers.
pub trait VectorIndex {
    /// Train the codec (and any coarse structure) on `n` vectors.
    ///
    /// Training with `n <= 1` yields an empty classification rather than
    /// an error. Retraining may change the code layout; previously stored
    /// codes are only meaningful for the layout they were encoded under.
    fn train(&mut self, n: usize, x: &[f32]) -> Result<()>;

    /// Append `n` vectors; labels continue from the current total.
    /// Fails before training.
    fn add(&mut self, n: usize, x: &[f32]) -> Result<()>;

    /// Search `n` queries for the `k` best labels by fused score.
    fn search(&self, n: usize, x: &[f32], k: usize) -> Result<SearchResult>;

    /// Decode the stored code for `label` back to a full-width vector;
    /// discarded features come back as zero.
    fn reconstruct(&self, label: i64) -> Result<Vec<f32>>;

    /// Drop all stored codes, keeping trained quantizer state and feature
    /// classification.
    fn reset(&mut self);

    /// Whether `train` has completed.
    fn is_trained(&self) -> bool;

    /// Number of stored vectors.
    fn ntotal(&self) -> usize;

    /// Input dimensionality.
    fn dimension(&self) -> usize;
}
