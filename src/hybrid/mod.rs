//! Hybrid variance-tiered codec and the two index variants built on it.
//!
//! The codec owns the feature classification and both sub-quantizers, and
//! defines the code layout: PQ bytes first, binary-rotation bytes second.
//! Either segment may be empty. The per-code distance of each tier is a
//! concrete strategy struct behind [`TierScorer`]; the fusion rule is the
//! same everywhere:
//!
//! ```text
//! fused = pq_multiplier * pq_contribution + itq_contribution
//! ```
//!
//! - `flat`: brute-force variant, full-corpus tier passes per query.
//! - `ivf`: inverted-file variant, lazy per-code scoring in probed
//!   clusters.

pub mod flat;
pub mod ivf;

pub use flat::FlatHybridIndex;
pub use ivf::IvfHybridIndex;

use crate::classify::{classify_features, FeatureClassification};
use crate::error::{IndexError, Result};
use crate::filter::{gather, gather_row, scatter_row};
use crate::itq::{hamming, ItqQuantizer, DEFAULT_ITQ_ITERS};
use crate::pq::{ProductQuantizer, CODEBOOK_SIZE};

use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Tuning parameters shared by both index variants.
#[derive(Clone, Copy, Debug)]
pub struct HybridParams {
    /// Scales the PQ-tier contribution relative to the binary tier (> 0).
    pub pq_multiplier: f32,
    /// Variance above this routes a feature to the PQ tier.
    pub th_high: f32,
    /// Variance above this (and at most `th_high`) routes a feature to the
    /// binary tier; at or below it the feature is discarded. Must satisfy
    /// `th_high > th_mid > 0`.
    pub th_mid: f32,
    /// ITQ rotation-refinement iterations.
    pub itq_iters: usize,
}

impl Default for HybridParams {
    fn default() -> Self {
        Self {
            pq_multiplier: 10.0,
            th_high: 0.05,
            th_mid: 0.005,
            itq_iters: DEFAULT_ITQ_ITERS,
        }
    }
}

impl HybridParams {
    /// Validate the construction-time invariants.
    pub fn validate(&self) -> Result<()> {
        if !(self.pq_multiplier > 0.0) {
            return Err(IndexError::InvalidParameter(
                "pq_multiplier must be positive".to_string(),
            ));
        }
        if !(self.th_mid > 0.0) {
            return Err(IndexError::InvalidParameter(
                "th_mid must be positive".to_string(),
            ));
        }
        if !(self.th_high > self.th_mid) {
            return Err(IndexError::InvalidParameter(
                "th_high must be greater than th_mid".to_string(),
            ));
        }
        Ok(())
    }
}

/// Codec splitting vectors across the two quantization tiers.
///
/// Code layout per vector: `[pq bytes][itq bytes]` with lengths
/// `pq_features.len()` and `ceil(itq_features.len() / 8)`. The layout is
/// fixed until the next `train` call; retraining on different data may
/// reclassify features and change the code length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridCodec {
    d: usize,
    th_high: f32,
    th_mid: f32,
    itq_iters: usize,
    reclassify_on_train: bool,
    classification: FeatureClassification,
    pq: ProductQuantizer,
    itq: ItqQuantizer,
    trained: bool,
}

impl HybridCodec {
    pub fn new(d: usize, params: &HybridParams) -> Self {
        Self {
            d,
            th_high: params.th_high,
            th_mid: params.th_mid,
            itq_iters: params.itq_iters,
            reclassify_on_train: true,
            classification: FeatureClassification::default(),
            pq: ProductQuantizer::new(0),
            itq: ItqQuantizer::new(0, params.itq_iters),
            trained: false,
        }
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.d
    }

    #[inline]
    pub fn is_trained(&self) -> bool {
        self.trained
    }

    /// Current feature classification.
    pub fn classification(&self) -> &FeatureClassification {
        &self.classification
    }

    /// Replace the classification wholesale (used together with
    /// `set_reclassify_on_train(false)` to pin externally chosen tiers).
    pub fn set_classification(&mut self, classification: FeatureClassification) {
        self.classification = classification;
    }

    /// Whether `train` recomputes the classification (default true).
    pub fn reclassify_on_train(&self) -> bool {
        self.reclassify_on_train
    }

    pub fn set_reclassify_on_train(&mut self, reclassify: bool) {
        self.reclassify_on_train = reclassify;
    }

    #[inline]
    pub fn pq_code_size(&self) -> usize {
        self.pq.code_size()
    }

    #[inline]
    pub fn itq_code_size(&self) -> usize {
        self.itq.code_size()
    }

    /// Total code length in bytes.
    #[inline]
    pub fn code_size(&self) -> usize {
        self.pq_code_size() + self.itq_code_size()
    }

    /// Train both sub-quantizers, reclassifying features first unless
    /// disabled. Reclassification on identical data and thresholds is
    /// idempotent; different data may change tier membership and therefore
    /// the code length, so callers must re-encode stored vectors after
    /// retraining.
    pub fn train(&mut self, n: usize, x: &[f32]) -> Result<()> {
        if self.reclassify_on_train {
            self.classification = classify_features(n, self.d, x, self.th_high, self.th_mid);
        }

        let pq_features = self.classification.pq_features.clone();
        if pq_features.is_empty() {
            self.pq = ProductQuantizer::new(0);
        } else {
            let sub = gather(n, self.d, x, &pq_features);
            let mut pq = ProductQuantizer::new(pq_features.len());
            pq.fit(&sub, n)?;
            self.pq = pq;
        }

        let itq_features = self.classification.itq_features.clone();
        if itq_features.is_empty() {
            self.itq = ItqQuantizer::new(0, self.itq_iters);
            let empty: [f32; 0] = [];
            self.itq.train(n, &empty);
        } else {
            let sub = gather(n, self.d, x, &itq_features);
            let mut itq = ItqQuantizer::new(itq_features.len(), self.itq_iters);
            itq.train(n, &sub);
            self.itq = itq;
        }

        self.trained = true;
        Ok(())
    }

    /// Encode one full-width row into `out` (`code_size()` bytes).
    pub fn encode_row(&self, row: &[f32], out: &mut [u8]) {
        debug_assert_eq!(out.len(), self.code_size());

        let (pq_code, itq_code) = out.split_at_mut(self.pq_code_size());

        let pq_features = &self.classification.pq_features;
        if !pq_features.is_empty() {
            let mut sub = vec![0.0f32; pq_features.len()];
            gather_row(row, pq_features, &mut sub);
            self.pq.encode_row(&sub, pq_code);
        }

        let itq_features = &self.classification.itq_features;
        if !itq_features.is_empty() {
            let mut sub = vec![0.0f32; itq_features.len()];
            gather_row(row, itq_features, &mut sub);
            itq_code.copy_from_slice(&self.itq.compute_codes(&sub, 1));
        }
    }

    /// Decode one code into a full-width row; positions outside both
    /// feature sets are zeroed.
    pub fn decode_into(&self, code: &[u8], out: &mut [f32]) {
        debug_assert_eq!(code.len(), self.code_size());
        debug_assert_eq!(out.len(), self.d);

        out.fill(0.0);
        let (pq_code, itq_code) = code.split_at(self.pq_code_size());

        let pq_features = &self.classification.pq_features;
        if !pq_features.is_empty() {
            let mut sub = vec![0.0f32; pq_features.len()];
            self.pq.decode_row(pq_code, &mut sub);
            scatter_row(&sub, pq_features, out);
        }

        let itq_features = &self.classification.itq_features;
        if !itq_features.is_empty() {
            let sub = self.itq.decode(itq_code, 1);
            scatter_row(&sub, itq_features, out);
        }
    }

    /// Per-query scorer for the PQ segment, `None` when the tier is empty.
    pub fn pq_scorer(&self, query: &[f32]) -> Option<PqScorer> {
        let features = &self.classification.pq_features;
        if features.is_empty() {
            return None;
        }

        let mut sub = vec![0.0f32; features.len()];
        gather_row(query, features, &mut sub);
        Some(PqScorer {
            table: self.pq.adc_table(&sub),
        })
    }

    /// Per-query scorer for the binary segment, `None` when the tier is
    /// empty.
    pub fn itq_scorer(&self, query: &[f32]) -> Option<ItqScorer> {
        let features = &self.classification.itq_features;
        if features.is_empty() {
            return None;
        }

        let mut sub = vec![0.0f32; features.len()];
        gather_row(query, features, &mut sub);
        Some(ItqScorer {
            query_code: self.itq.compute_codes(&sub, 1),
            dims: features.len(),
        })
    }
}

/// Per-code distance contribution of one quantization tier.
///
/// Implementations hold all per-query state, so scoring a stored code is
/// read-only and allocation-free.
pub trait TierScorer {
    /// Similarity contribution of one stored tier code (inner-product
    /// convention: larger is better).
    fn distance_to_code(&self, code: &[u8]) -> f32;
}

/// Asymmetric PQ scoring through a per-query ADC table.
pub struct PqScorer {
    table: Vec<f32>,
}

impl TierScorer for PqScorer {
    #[inline]
    fn distance_to_code(&self, code: &[u8]) -> f32 {
        let mut total = 0.0;
        for (feature, &c) in code.iter().enumerate() {
            total += self.table[feature * CODEBOOK_SIZE + c as usize];
        }
        total
    }
}

/// Hamming scoring against the query's own binary code, mapped to the
/// inner-product estimate `d - 2h`.
pub struct ItqScorer {
    query_code: Vec<u8>,
    dims: usize,
}

impl TierScorer for ItqScorer {
    #[inline]
    fn distance_to_code(&self, code: &[u8]) -> f32 {
        self.dims as f32 - 2.0 * hamming(&self.query_code, code) as f32
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Candidate {
    score: f32,
    label: i64,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Ties rank the lower label first, so results are deterministic
        // regardless of scan order.
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.label.cmp(&self.label))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Bounded larger-is-better top-k selection over a stream of candidates.
///
/// Holds at most `k` entries in a min-oriented heap: push while below
/// capacity, afterwards replace the current minimum whenever a candidate
/// strictly exceeds it.
pub(crate) struct TopK {
    heap: BinaryHeap<Reverse<Candidate>>,
    k: usize,
}

impl TopK {
    pub(crate) fn new(k: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(k + 1),
            k,
        }
    }

    #[inline]
    pub(crate) fn push(&mut self, score: f32, label: i64) {
        let candidate = Candidate { score, label };
        if self.heap.len() < self.k {
            self.heap.push(Reverse(candidate));
        } else if let Some(Reverse(min)) = self.heap.peek() {
            if candidate > *min {
                self.heap.pop();
                self.heap.push(Reverse(candidate));
            }
        }
    }

    /// Drain into `k`-slot output rows in descending score order, padding
    /// missing slots with the no-match sentinel.
    pub(crate) fn write_into(mut self, distances: &mut [f32], labels: &mut [i64]) {
        debug_assert_eq!(distances.len(), self.k);
        debug_assert_eq!(labels.len(), self.k);

        let available = self.heap.len();
        for slot in (0..available).rev() {
            if let Some(Reverse(candidate)) = self.heap.pop() {
                distances[slot] = candidate.score;
                labels[slot] = candidate.label;
            }
        }
        for slot in available..self.k {
            distances[slot] = f32::NEG_INFINITY;
            labels[slot] = crate::index::NO_RESULT;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_reject_bad_tuples() {
        let cases = [(-1.0, 5.0, 4.0), (0.0, 5.0, 4.0), (10.0, 5.0, -1.0), (10.0, 4.0, 5.0)];
        for (pq_multiplier, th_high, th_mid) in cases {
            let params = HybridParams {
                pq_multiplier,
                th_high,
                th_mid,
                ..HybridParams::default()
            };
            assert!(params.validate().is_err(), "accepted {params:?}");
        }
        assert!(HybridParams::default().validate().is_ok());
    }

    #[test]
    fn top_k_pads_with_sentinels() {
        let topk = TopK::new(3);
        let mut distances = [0.0f32; 3];
        let mut labels = [0i64; 3];
        topk.write_into(&mut distances, &mut labels);

        assert_eq!(labels, [-1, -1, -1]);
        assert!(distances.iter().all(|d| *d == f32::NEG_INFINITY));
    }

    #[test]
    fn top_k_orders_descending_and_pads_tail() {
        let mut topk = TopK::new(4);
        topk.push(1.0, 0);
        topk.push(5.0, 1);
        topk.push(3.0, 2);

        let mut distances = [0.0f32; 4];
        let mut labels = [0i64; 4];
        topk.write_into(&mut distances, &mut labels);

        assert_eq!(labels, [1, 2, 0, -1]);
        assert_eq!(&distances[..3], &[5.0, 3.0, 1.0]);
        assert_eq!(distances[3], f32::NEG_INFINITY);
    }

    #[test]
    fn top_k_keeps_best_of_overflow() {
        let mut topk = TopK::new(2);
        for (score, label) in [(1.0, 0), (9.0, 1), (2.0, 2), (8.0, 3), (0.5, 4)] {
            topk.push(score, label);
        }

        let mut distances = [0.0f32; 2];
        let mut labels = [0i64; 2];
        topk.write_into(&mut distances, &mut labels);
        assert_eq!(labels, [1, 3]);
        assert_eq!(distances, [9.0, 8.0]);
    }

    #[test]
    fn top_k_ties_prefer_lower_label() {
        let mut topk = TopK::new(2);
        topk.push(7.0, 5);
        topk.push(7.0, 1);
        topk.push(7.0, 9);

        let mut distances = [0.0f32; 2];
        let mut labels = [0i64; 2];
        topk.write_into(&mut distances, &mut labels);
        assert_eq!(labels, [1, 5]);
    }

    #[test]
    fn codec_with_empty_tiers_has_zero_code_size() {
        let params = HybridParams::default();
        let mut codec = HybridCodec::new(4, &params);
        // One training vector: degenerate, classification stays empty.
        codec.train(1, &[1.0, 2.0, 3.0, 4.0]).unwrap();

        assert!(codec.is_trained());
        assert_eq!(codec.code_size(), 0);
        assert!(codec.pq_scorer(&[0.0; 4]).is_none());
        assert!(codec.itq_scorer(&[0.0; 4]).is_none());
    }

    #[test]
    fn codec_encode_decode_leaves_discarded_features_zero() {
        let params = HybridParams::default();
        let mut codec = HybridCodec::new(4, &params);
        codec.set_reclassify_on_train(false);
        codec.set_classification(FeatureClassification::from_feature_sets(vec![1], vec![3]));

        let x: Vec<f32> = (0..40)
            .flat_map(|i| {
                let i = i as f32;
                [9.9, i * 2.0 - 40.0, -3.3, if i < 20.0 { 4.0 } else { -4.0 }]
            })
            .collect();
        codec.train(40, &x).unwrap();

        assert_eq!(codec.code_size(), 2); // 1 PQ byte + 1 ITQ byte

        let mut code = vec![0u8; 2];
        codec.encode_row(&x[0..4], &mut code);

        let mut out = vec![7.0f32; 4];
        codec.decode_into(&code, &mut out);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[2], 0.0);
        assert!((out[1] - x[1]).abs() < 1.0);
    }
}
