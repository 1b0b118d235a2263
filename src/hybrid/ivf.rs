//! Inverted-file hybrid index: coarse clustering plus lazy fused scoring.

use super::{HybridCodec, HybridParams, TierScorer, TopK};
use crate::diagnostics::{EventSink, IndexEvent, Reporter};
use crate::error::{IndexError, Result};
use crate::index::{SearchResult, VectorIndex};
use crate::kmeans::KMeans;
use crate::simd;

use std::time::Instant;

/// Seed for coarse-centroid training.
const COARSE_SEED: u64 = 0xc0a2_5e00;

#[derive(Debug, Clone, Default)]
struct InvertedList {
    ids: Vec<i64>,
    codes: Vec<u8>,
}

/// IVF hybrid index.
///
/// Vectors are routed to the coarse cluster with the highest
/// inner-product centroid score and stored as hybrid codes inside that
/// cluster's list. Search scans the `nprobe` best clusters and evaluates
/// the same fused distance as the flat variant, lazily per scanned code.
#[derive(Debug)]
pub struct IvfHybridIndex {
    codec: HybridCodec,
    pq_multiplier: f32,
    nlist: usize,
    nprobe: usize,
    centroids: Vec<Vec<f32>>,
    lists: Vec<InvertedList>,
    ntotal: usize,
    reporter: Reporter,
}

impl IvfHybridIndex {
    /// Create an index over `d`-dimensional vectors partitioned into
    /// `nlist` coarse clusters.
    pub fn new(d: usize, nlist: usize, params: HybridParams) -> Result<Self> {
        params.validate()?;
        if nlist == 0 {
            return Err(IndexError::InvalidParameter(
                "nlist must be positive".to_string(),
            ));
        }

        Ok(Self {
            codec: HybridCodec::new(d, &params),
            pq_multiplier: params.pq_multiplier,
            nlist,
            nprobe: 1,
            centroids: Vec::new(),
            lists: Vec::new(),
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

    /// Number of coarse clusters scanned per query (default 1).
    pub fn nprobe(&self) -> usize {
        self.nprobe
    }

    pub fn set_nprobe(&mut self, nprobe: usize) {
        self.nprobe = nprobe.max(1);
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

    /// Decode the stored code at `offset` within cluster `list_no`.
    pub fn reconstruct_from_offset(&self, list_no: usize, offset: usize) -> Result<Vec<f32>> {
        if !self.codec.is_trained() {
            return Err(IndexError::NotTrained);
        }
        let list = self
            .lists
            .get(list_no)
            .ok_or_else(|| IndexError::InvalidParameter(format!("no such cluster: {list_no}")))?;
        if offset >= list.ids.len() {
            return Err(IndexError::InvalidParameter(format!(
                "offset {offset} out of range for cluster {list_no}"
            )));
        }

        let cs = self.codec.code_size();
        let code = &list.codes[offset * cs..(offset + 1) * cs];
        let mut out = vec![0.0f32; self.codec.dimension()];
        self.codec.decode_into(code, &mut out);
        Ok(out)
    }

    /// Coarse assignment: nearest centroid under the inner-product metric.
    fn assign_cluster(&self, row: &[f32]) -> usize {
        let mut best = 0;
        let mut best_score = f32::NEG_INFINITY;
        for (idx, centroid) in self.centroids.iter().enumerate() {
            let score = simd::dot(row, centroid);
            if score > best_score {
                best_score = score;
                best = idx;
            }
        }
        best
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

impl VectorIndex for IvfHybridIndex {
    fn train(&mut self, n: usize, x: &[f32]) -> Result<()> {
        self.check_rows(n, x)?;

        let started = Instant::now();
        let d = self.codec.dimension();
        self.reporter.emit(IndexEvent::TrainBegin { n, d });

        self.codec.train(n, x)?;

        let c = self.codec.classification();
        self.reporter.emit(IndexEvent::FeaturesClassified {
            pq: c.pq_features.len(),
            itq: c.itq_features.len(),
            discarded: d - c.pq_features.len() - c.itq_features.len(),
        });

        // Coarse partition over the full-width vectors. The code store is
        // reallocated for the final code length, dropping previously
        // stored codes (their layout may no longer match).
        let mut km = KMeans::new(d, self.nlist)?.with_seed(COARSE_SEED);
        km.fit(x, n)?;
        self.centroids = km.centroids().to_vec();
        self.lists = vec![InvertedList::default(); self.centroids.len()];
        self.ntotal = 0;

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
        let mut code = vec![0u8; self.codec.code_size()];

        for (i, row) in x.chunks_exact(d.max(1)).take(n).enumerate() {
            let cluster = self.assign_cluster(row);
            self.codec.encode_row(row, &mut code);

            let list = &mut self.lists[cluster];
            list.ids.push((self.ntotal + i) as i64);
            list.codes.extend_from_slice(&code);
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
        let cs = self.codec.code_size();

        let mut result = SearchResult::sentinel_filled(n, k);

        for (qi, query) in x.chunks_exact(d.max(1)).take(n).enumerate() {
            let mut ranked: Vec<(usize, f32)> = self
                .centroids
                .iter()
                .enumerate()
                .map(|(idx, centroid)| (idx, simd::dot(query, centroid)))
                .collect();
            ranked.sort_unstable_by(|a, b| b.1.total_cmp(&a.1));

            let pq_scorer = self.codec.pq_scorer(query);
            let itq_scorer = self.codec.itq_scorer(query);

            let mut topk = TopK::new(k);
            for &(cluster, _) in ranked.iter().take(self.nprobe) {
                let list = &self.lists[cluster];

                if cs == 0 {
                    // Both tiers empty: every stored code scores zero.
                    for &id in &list.ids {
                        topk.push(0.0, id);
                    }
                    continue;
                }

                for (&id, code) in list.ids.iter().zip(list.codes.chunks_exact(cs)) {
                    let (pq_code, itq_code) = code.split_at(psz);

                    let mut score = 0.0;
                    if let Some(scorer) = &pq_scorer {
                        score = self.pq_multiplier * scorer.distance_to_code(pq_code);
                    }
                    if let Some(scorer) = &itq_scorer {
                        score += scorer.distance_to_code(itq_code);
                    }
                    topk.push(score, id);
                }
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

        for (list_no, list) in self.lists.iter().enumerate() {
            if let Some(offset) = list.ids.iter().position(|&id| id == label) {
                return self.reconstruct_from_offset(list_no, offset);
            }
        }
        Err(IndexError::LabelOutOfRange(label))
    }

    fn reset(&mut self) {
        for list in &mut self.lists {
            list.ids.clear();
            list.codes.clear();
        }
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
