//! Brute-force hybrid index with exact fused ranking.

use super::{HybridCodec, HybridParams, TierScorer, TopK};
use crate::diagnostics::{EventSink, IndexEvent, Reporter};
use crate::error::{IndexError, Result};
use crate::index::{SearchResult, VectorIndex};

use std::time::Instant;

/// Flat (exhaustive) hybrid index.
///
/// Stores per-tier code arrays in parallel, sharing one insertion-order
/// label space. Each query runs a full pass over every stored code in each
/// non-empty tier, fuses the two contributions per label, and selects the
/// top k with a bounded heap. O(ntotal) per query by design: the per-tier
/// top-k lists are not guaranteed to contain the true fused top-k, so
/// exactness requires scoring everything.
#[derive(Debug)]
pub struct FlatHybridIndex {
    codec: HybridCodec,
    pq_multiplier: f32,
    pq_codes: Vec<u8>,
    itq_codes: Vec<u8>,
    ntotal: usize,
    reporter: Reporter,
}

impl FlatHybridIndex {
    /// Create an index over `d`-dimensional vectors. Fails on invalid
    /// tuning parameters; no usable instance is produced in that case.
    pub fn new(d: usize, params: HybridParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            codec: HybridCodec::new(d, &params),
            pq_multiplier: params.pq_multiplier,
            pq_codes: Vec::new(),
            itq_codes: Vec::new(),
            ntotal: 0,
            reporter: Reporter::default(),
        })
    }

    /// Attach a diagnostics sink receiving train/add events.
    #[must_use]
    pub fn with_event_sink(mut self, sink: EventSink) -> Self {
        self.reporter.set_sink(sink);
        self
    }

    /// Access to the owned codec (classification, code layout).
    pub fn codec(&self) -> &HybridCodec {
        &self.codec
    }

    /// Pin externally chosen feature sets; meaningful together with
    /// `set_reclassify_on_train(false)`.
    pub fn set_feature_sets(&mut self, pq_features: Vec<usize>, itq_features: Vec<usize>) {
        self.codec.set_classification(
            crate::classify::FeatureClassification::from_feature_sets(pq_features, itq_features),
        );
    }

    pub fn set_reclassify_on_train(&mut self, reclassify: bool) {
        self.codec.set_reclassify_on_train(reclassify);
    }

    pub fn reclassify_on_train(&self) -> bool {
        self.codec.reclassify_on_train()
    }

    fn check_rows(&self, n: usize, x: &[f32]) -> Result<()> {
        let expected = n * self.codec.dimension();
        if x.len() != expected {
            return Err(IndexError::DimensionMismatch {
                expected,
                actual: x.len(),
            });
        }
        Ok(())
    }
}

impl VectorIndex for FlatHybridIndex {
    fn train(&mut self, n: usize, x: &[f32]) -> Result<()> {
        self.check_rows(n, x)?;

        let started = Instant::now();
        self.reporter.emit(IndexEvent::TrainBegin {
            n,
            d: self.codec.dimension(),
        });

        self.codec.train(n, x)?;

        let c = self.codec.classification();
        self.reporter.emit(IndexEvent::FeaturesClassified {
            pq: c.pq_features.len(),
            itq: c.itq_features.len(),
            discarded: self.codec.dimension() - c.pq_features.len() - c.itq_features.len(),
        });
        self.reporter.emit(IndexEvent::TrainComplete {
            code_size: self.codec.code_size(),
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
        });
        Ok(())
    }

    fn add(&mut self, n: usize, x: &[f32]) -> Result<()> {
        if !self.codec.is_trained() {
            return Err(IndexError::NotTrained);
        }
        self.check_rows(n, x)?;

        let started = Instant::now();
        let d = self.codec.dimension();
        let psz = self.codec.pq_code_size();
        let mut code = vec![0u8; self.codec.code_size()];

        for row in x.chunks_exact(d.max(1)).take(n) {
            self.codec.encode_row(row, &mut code);
            self.pq_codes.extend_from_slice(&code[..psz]);
            self.itq_codes.extend_from_slice(&code[psz..]);
        }

        self.ntotal += n;
        self.reporter.emit(IndexEvent::VectorsAdded {
            n,
            ntotal: self.ntotal,
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
        });
        Ok(())
    }

    fn search(&self, n: usize, x: &[f32], k: usize) -> Result<SearchResult> {
        if !self.codec.is_trained() {
            return Err(IndexError::NotTrained);
        }
        if k == 0 {
            return Err(IndexError::InvalidParameter(
                "k must be positive".to_string(),
            ));
        }
        self.check_rows(n, x)?;

        let d = self.codec.dimension();
        let psz = self.codec.pq_code_size();
        let isz = self.codec.itq_code_size();

        let mut result = SearchResult::sentinel_filled(n, k);
        let mut totals = vec![0.0f32; self.ntotal];

        for (qi, query) in x.chunks_exact(d.max(1)).take(n).enumerate() {
            totals.fill(0.0);

            // Full-tier pass: every label appears exactly once per tier,
            // so the PQ pass assigns and the ITQ pass accumulates.
            if let Some(scorer) = self.codec.pq_scorer(query) {
                for (label, code) in self.pq_codes.chunks_exact(psz).enumerate() {
                    totals[label] = self.pq_multiplier * scorer.distance_to_code(code);
                }
            }
            if let Some(scorer) = self.codec.itq_scorer(query) {
                for (label, code) in self.itq_codes.chunks_exact(isz).enumerate() {
                    totals[label] += scorer.distance_to_code(code);
                }
            }

            let mut topk = TopK::new(k);
            for (label, &score) in totals.iter().enumerate() {
                topk.push(score, label as i64);
            }
            topk.write_into(
                &mut result.distances[qi * k..(qi + 1) * k],
                &mut result.labels[qi * k..(qi + 1) * k],
            );
        }

        Ok(result)
    }

    fn reconstruct(&self, label: i64) -> Result<Vec<f32>> {
        if !self.codec.is_trained() {
            return Err(IndexError::NotTrained);
        }
        if label < 0 || label as usize >= self.ntotal {
            return Err(IndexError::LabelOutOfRange(label));
        }

        let idx = label as usize;
        let psz = self.codec.pq_code_size();
        let isz = self.codec.itq_code_size();

        let mut code = Vec::with_capacity(psz + isz);
        code.extend_from_slice(&self.pq_codes[idx * psz..(idx + 1) * psz]);
        code.extend_from_slice(&self.itq_codes[idx * isz..(idx + 1) * isz]);

        let mut out = vec![0.0f32; self.codec.dimension()];
        self.codec.decode_into(&code, &mut out);
        Ok(out)
    }

    fn reset(&mut self) {
        self.pq_codes.clear();
        self.itq_codes.clear();
        self.ntotal = 0;
    }

    fn is_trained(&self) -> bool {
        self.codec.is_trained()
    }

    fn ntotal(&self) -> usize {
        self.ntotal
    }

    fn dimension(&self) -> usize {
        self.codec.dimension()
    }
}
