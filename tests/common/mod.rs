//! Shared helpers for integration tests: the standard dataset, query
//! construction, and a small harness that runs the same scenario against
//! both index variants.

#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use trivar::{
    FlatHybridIndex, HybridParams, IvfHybridIndex, Result, SearchResult, VectorIndex,
};

pub const DEFAULT_DIM: usize = 6;
pub const DEFAULT_DB_SIZE: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Flat,
    Ivf,
}

pub const VARIANTS: [Variant; 2] = [Variant::Flat, Variant::Ivf];

/// Either index variant behind one concrete wrapper, so tests can reach
/// both the shared `VectorIndex` surface and the variant-independent
/// configuration knobs.
pub enum AnyIndex {
    Flat(FlatHybridIndex),
    Ivf(IvfHybridIndex),
}

impl AnyIndex {
    pub fn as_index(&mut self) -> &mut dyn VectorIndex {
        match self {
            AnyIndex::Flat(index) => index,
            AnyIndex::Ivf(index) => index,
        }
    }

    pub fn as_index_ref(&self) -> &dyn VectorIndex {
        match self {
            AnyIndex::Flat(index) => index,
            AnyIndex::Ivf(index) => index,
        }
    }

    pub fn set_feature_sets(&mut self, pq_features: Vec<usize>, itq_features: Vec<usize>) {
        match self {
            AnyIndex::Flat(index) => index.set_feature_sets(pq_features, itq_features),
            AnyIndex::Ivf(index) => index.set_feature_sets(pq_features, itq_features),
        }
    }

    pub fn set_reclassify_on_train(&mut self, reclassify: bool) {
        match self {
            AnyIndex::Flat(index) => index.set_reclassify_on_train(reclassify),
            AnyIndex::Ivf(index) => index.set_reclassify_on_train(reclassify),
        }
    }

    pub fn reclassify_on_train(&self) -> bool {
        match self {
            AnyIndex::Flat(index) => index.reclassify_on_train(),
            AnyIndex::Ivf(index) => index.reclassify_on_train(),
        }
    }

    pub fn pq_features(&self) -> Vec<usize> {
        self.codec_classification().pq_features.clone()
    }

    pub fn itq_features(&self) -> Vec<usize> {
        self.codec_classification().itq_features.clone()
    }

    pub fn variances(&self) -> Vec<f32> {
        self.codec_classification().variances.clone()
    }

    fn codec_classification(&self) -> &trivar::FeatureClassification {
        match self {
            AnyIndex::Flat(index) => index.codec().classification(),
            AnyIndex::Ivf(index) => index.codec().classification(),
        }
    }
}

pub fn params(pq_multiplier: f32, th_high: f32, th_mid: f32) -> HybridParams {
    HybridParams {
        pq_multiplier,
        th_high,
        th_mid,
        ..HybridParams::default()
    }
}

/// Mirror of the construction used throughout the suite: the IVF variant
/// gets 10 clusters with 4 probes, or a single probed cluster when
/// `force_flat` asks for ranking identical to the flat variant.
pub fn create_index(
    variant: Variant,
    d: usize,
    params: HybridParams,
    force_flat: bool,
) -> Result<AnyIndex> {
    match variant {
        Variant::Flat => Ok(AnyIndex::Flat(FlatHybridIndex::new(d, params)?)),
        Variant::Ivf => {
            let nlist = if force_flat { 1 } else { 10 };
            let mut index = IvfHybridIndex::new(d, nlist, params)?;
            index.set_nprobe(if force_flat { 1 } else { 4 });
            Ok(AnyIndex::Ivf(index))
        }
    }
}

pub fn default_index(variant: Variant) -> AnyIndex {
    create_index(variant, DEFAULT_DIM, HybridParams::default(), false)
        .expect("default parameters must be accepted")
}

/// Fixed dataset with a known similarity structure: row 2 is the ramp
/// `0, 1, .., d-1`, rows 1 and 3 are all ones, every other row i is the
/// ramp scaled by -i.
pub fn standard_dataset(db_size: usize, d: usize) -> Vec<f32> {
    let mut xdb = Vec::with_capacity(db_size * d);
    for i in 0..db_size {
        for j in 0..d {
            let v = if i == 2 {
                j as f32
            } else if i == 1 || i == 3 {
                1.0
            } else {
                -((i * j) as f32)
            };
            xdb.push(v);
        }
    }
    xdb
}

/// Two queries derived from row 2 of the dataset: the row itself and a
/// slightly perturbed copy, both normalized. Their nearest rows are 2
/// followed by the all-ones rows 1 and 3.
pub fn standard_query(xdb: &[f32], d: usize) -> Vec<f32> {
    let mut xq = xdb[2 * d..3 * d].to_vec();
    let perturbed: Vec<f32> = xq.iter().map(|v| v + 0.01).collect();
    xq.extend(perturbed);
    normalize(&mut xq, d);
    xq
}

pub fn normalize(x: &mut [f32], d: usize) {
    assert_eq!(x.len() % d, 0);
    for row in x.chunks_exact_mut(d) {
        let sum_square: f32 = row.iter().map(|v| v * v).sum();
        if sum_square > 0.0 {
            let norm = sum_square.sqrt();
            for v in row {
                *v /= norm;
            }
        }
    }
}

pub fn random_vectors(len: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.random_range(0.0..1000.0f32)).collect()
}

pub fn search(index: &dyn VectorIndex, xq: &[f32], k: usize) -> SearchResult {
    let nq = xq.len() / index.dimension().max(1);
    index.search(nq, xq, k).expect("search failed")
}

/// Run the standard two-query probe and check that the top 3 labels are
/// row 2 followed by the tied all-ones rows in either order.
pub fn verify_with_standard_query(xdb: &[f32], index: &dyn VectorIndex) {
    let d = index.dimension();
    let xq = standard_query(xdb, d);
    let nq = xq.len() / d;
    let k = 3;

    let hits = search(index, &xq, k);

    for i in 0..nq {
        let labels = &hits.labels[i * k..(i + 1) * k];
        assert!(
            labels == [2, 1, 3] || labels == [2, 3, 1],
            "query {i}: unexpected top labels {labels:?}"
        );
    }
}
