//! Product quantization for the high-variance tier.
//!
//! One 8-bit codebook (256 scalar centroids) per routed feature, so a code
//! is exactly one byte per feature. Query-side distances use Asymmetric
//! Distance Computation in the inner-product convention: the uncompressed
//! query sub-vector is compared against decoded centroids, either directly
//! or through a precomputed lookup table.

use crate::error::Result;
use crate::kmeans::KMeans;

use serde::{Deserialize, Serialize};

/// Codebook precision: 8 bits, 256 centroids, 1 byte per feature.
pub const CODEBOOK_BITS: usize = 8;
pub(crate) const CODEBOOK_SIZE: usize = 1 << CODEBOOK_BITS;

/// Seed base for codebook training; per-feature seeds derive from it so
/// training is deterministic across runs and across index variants.
const CODEBOOK_SEED: u64 = 0x7157_aa00;

/// Product quantizer over `m` sub-features.
///
/// `m == 0` is a valid empty quantizer with zero code length that encodes
/// and decodes nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductQuantizer {
    m: usize,
    /// One centroid table per feature; each may hold fewer than 256
    /// entries when the training data has fewer distinct values.
    codebooks: Vec<Vec<f32>>,
}

impl ProductQuantizer {
    /// Create an untrained quantizer over `m` sub-features.
    pub fn new(m: usize) -> Self {
        Self {
            m,
            codebooks: Vec::new(),
        }
    }

    /// Code length in bytes (1 byte per sub-feature).
    #[inline]
    pub fn code_size(&self) -> usize {
        self.m
    }

    /// Number of sub-features.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.m
    }

    /// Train one codebook per sub-feature on `n` row-major sub-vectors.
    pub fn fit(&mut self, x: &[f32], n: usize) -> Result<()> {
        self.codebooks = Vec::with_capacity(self.m);

        let mut column = vec![0.0f32; n];
        for feature in 0..self.m {
            for (i, slot) in column.iter_mut().enumerate() {
                *slot = x[i * self.m + feature];
            }

            let k = CODEBOOK_SIZE.min(n);
            let mut km = KMeans::new(1, k)?.with_seed(CODEBOOK_SEED + feature as u64);
            km.fit(&column, n)?;

            self.codebooks
                .push(km.centroids().iter().map(|c| c[0]).collect());
        }

        Ok(())
    }

    /// Encode one sub-vector: nearest centroid per feature.
    pub fn encode_row(&self, row: &[f32], out: &mut [u8]) {
        debug_assert_eq!(row.len(), self.m);
        debug_assert_eq!(out.len(), self.m);

        for ((slot, &v), codebook) in out.iter_mut().zip(row).zip(&self.codebooks) {
            let mut best = 0usize;
            let mut best_dist = f32::INFINITY;
            for (c, &centroid) in codebook.iter().enumerate() {
                let d = (v - centroid) * (v - centroid);
                if d < best_dist {
                    best_dist = d;
                    best = c;
                }
            }
            *slot = best as u8;
        }
    }

    /// Decode one code back to approximate sub-vector values.
    pub fn decode_row(&self, code: &[u8], out: &mut [f32]) {
        debug_assert_eq!(code.len(), self.m);
        debug_assert_eq!(out.len(), self.m);

        for ((slot, &c), codebook) in out.iter_mut().zip(code).zip(&self.codebooks) {
            *slot = codebook[c as usize];
        }
    }

    /// Precompute the per-query ADC table of inner products
    /// `query[f] * codebook[f][c]`, laid out feature-major with a fixed
    /// stride of 256 entries per feature.
    pub fn adc_table(&self, query: &[f32]) -> Vec<f32> {
        debug_assert_eq!(query.len(), self.m);

        let mut table = vec![0.0f32; self.m * CODEBOOK_SIZE];
        for (feature, (&q, codebook)) in query.iter().zip(&self.codebooks).enumerate() {
            let base = feature * CODEBOOK_SIZE;
            for (c, &centroid) in codebook.iter().enumerate() {
                table[base + c] = q * centroid;
            }
        }
        table
    }

    /// Asymmetric inner-product distance via a precomputed table.
    #[inline]
    pub fn distance_with_table(&self, table: &[f32], code: &[u8]) -> f32 {
        let mut total = 0.0;
        for (feature, &c) in code.iter().enumerate() {
            total += table[feature * CODEBOOK_SIZE + c as usize];
        }
        total
    }

    /// Asymmetric inner-product distance without a table.
    pub fn asymmetric_inner_product(&self, query: &[f32], code: &[u8]) -> f32 {
        debug_assert_eq!(query.len(), self.m);

        query
            .iter()
            .zip(code)
            .zip(&self.codebooks)
            .map(|((&q, &c), codebook)| q * codebook[c as usize])
            .sum()
    }
}
