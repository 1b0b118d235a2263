//! Per-feature variance estimation and tier classification.
//!
//! Each feature (input dimension) is routed to one of three compression
//! tiers by its training-time variance:
//!
//! - variance > `th_high`: product quantization (1 byte per feature),
//! - `th_mid` < variance <= `th_high`: binary rotation code (1 bit),
//! - otherwise: discarded from the compressed representation.
//!
//! The variance profile is the per-axis equivalent of an eigen
//! decomposition with no whitening and no rotation: eigenvalue i
//! corresponds to feature axis i. Following the original scaling, the
//! population variance (sum of squared deviations over n) is divided by
//! n - 1, so thresholds are calibrated against that scaled profile.

use serde::{Deserialize, Serialize};

/// Result of classifying features into quantization tiers.
///
/// Produced whole by [`classify_features`] and swapped atomically into
/// index state; never mutated field-by-field. Feature indices are stored
/// in increasing order and the two sets are disjoint. The discarded set is
/// implicit (every index in `0..d` absent from both).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureClassification {
    /// High-variance features, compressed with product quantization.
    pub pq_features: Vec<usize>,
    /// Mid-variance features, compressed with the binary rotation code.
    pub itq_features: Vec<usize>,
    /// Scaled per-feature variance profile, length d (empty when n <= 1).
    pub variances: Vec<f32>,
}

impl FeatureClassification {
    /// Build a classification from externally chosen feature sets.
    ///
    /// Used when reclassification at train time is disabled and the caller
    /// supplies the tier membership directly. No variance profile is
    /// attached.
    pub fn from_feature_sets(pq_features: Vec<usize>, itq_features: Vec<usize>) -> Self {
        Self {
            pq_features,
            itq_features,
            variances: Vec::new(),
        }
    }
}

/// Classify the features of `n` row-major training vectors of width `d`.
///
/// For `n <= 1` no variance estimate exists; the result is empty rather
/// than an error, distinguishing "not enough data" from a real failure.
pub fn classify_features(
    n: usize,
    d: usize,
    x: &[f32],
    th_high: f32,
    th_mid: f32,
) -> FeatureClassification {
    if n <= 1 {
        return FeatureClassification::default();
    }

    debug_assert!(x.len() >= n * d);

    let variances = scaled_variances(n, d, x);

    let mut pq_features = Vec::new();
    let mut itq_features = Vec::new();

    for (i, &v) in variances.iter().enumerate() {
        if v > th_high {
            pq_features.push(i);
        } else if v > th_mid {
            itq_features.push(i);
        }
    }

    FeatureClassification {
        pq_features,
        itq_features,
        variances,
    }
}

/// Per-axis population variance scaled by 1/(n-1).
fn scaled_variances(n: usize, d: usize, x: &[f32]) -> Vec<f32> {
    let mut means = vec![0.0f64; d];
    for row in x.chunks_exact(d).take(n) {
        for (m, &v) in means.iter_mut().zip(row) {
            *m += f64::from(v);
        }
    }
    for m in &mut means {
        *m /= n as f64;
    }

    let mut scatter = vec![0.0f64; d];
    for row in x.chunks_exact(d).take(n) {
        for ((s, &v), &m) in scatter.iter_mut().zip(row).zip(&means) {
            let c = f64::from(v) - m;
            *s += c * c;
        }
    }

    scatter
        .iter()
        .map(|s| (s / n as f64 / (n - 1) as f64) as f32)
        .collect()
}
