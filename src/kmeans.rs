//! k-means clustering.
//!
//! Generic k-means used for PQ codebook training (1-dimensional, many
//! centroids) and for the IVF coarse partition (full-width, few
//! centroids). Uses k-means++ initialization with a caller-supplied seed
//! so repeated `fit(...)` calls on the same inputs produce identical
//! centroids.

use crate::error::{IndexError, Result};
use crate::simd;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const MAX_ITERATIONS: usize = 100;
const CONVERGENCE_EPS: f32 = 1e-6;

/// k-means clustering with deterministic seeded initialization.
pub struct KMeans {
    centroids: Vec<Vec<f32>>,
    dimension: usize,
    k: usize,
    seed: u64,
}

impl KMeans {
    /// Create new k-means with up to `k` clusters.
    pub fn new(dimension: usize, k: usize) -> Result<Self> {
        if dimension == 0 || k == 0 {
            return Err(IndexError::InvalidParameter(
                "dimension and k must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            centroids: Vec::new(),
            dimension,
            k,
            seed: 0,
        })
    }

    /// Set the seed for k-means++ initialization.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Train on `num_vectors` row-major vectors.
    ///
    /// When the data has fewer than `k` distinct points, fewer centroids
    /// are produced; `centroids().len()` is the effective cluster count.
    pub fn fit(&mut self, vectors: &[f32], num_vectors: usize) -> Result<()> {
        if num_vectors == 0 || vectors.len() < num_vectors * self.dimension {
            return Err(IndexError::InvalidParameter(
                "insufficient training vectors".to_string(),
            ));
        }

        self.centroids = self.init_plus_plus(vectors, num_vectors);

        for _ in 0..MAX_ITERATIONS {
            let assignments = self.assign_clusters(vectors, num_vectors);
            let new_centroids = self.update_centroids(vectors, num_vectors, &assignments);

            let mut converged = true;
            for (old, new) in self.centroids.iter().zip(&new_centroids) {
                if simd::l2_distance_squared(old, new) > CONVERGENCE_EPS {
                    converged = false;
                    break;
                }
            }

            self.centroids = new_centroids;
            if converged {
                break;
            }
        }

        Ok(())
    }

    /// k-means++ initialization: first centroid sampled uniformly, each
    /// subsequent one with probability proportional to its squared distance
    /// from the nearest chosen centroid. Stops early once every point
    /// coincides with a centroid.
    fn init_plus_plus(&self, vectors: &[f32], num_vectors: usize) -> Vec<Vec<f32>> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut centroids: Vec<Vec<f32>> = Vec::with_capacity(self.k.min(num_vectors));

        let first = rng.random_range(0..num_vectors);
        centroids.push(self.row(vectors, first).to_vec());

        let mut dist_sq = vec![0.0f32; num_vectors];
        while centroids.len() < self.k.min(num_vectors) {
            let mut total = 0.0f64;
            for (i, d) in dist_sq.iter_mut().enumerate() {
                let row = self.row(vectors, i);
                *d = centroids
                    .iter()
                    .map(|c| simd::l2_distance_squared(row, c))
                    .fold(f32::INFINITY, f32::min);
                total += f64::from(*d);
            }

            if total <= 0.0 {
                break;
            }

            let mut target = rng.random::<f64>() * total;
            let mut chosen = num_vectors - 1;
            for (i, &d) in dist_sq.iter().enumerate() {
                target -= f64::from(d);
                if target <= 0.0 {
                    chosen = i;
                    break;
                }
            }

            centroids.push(self.row(vectors, chosen).to_vec());
        }

        centroids
    }

    /// Assign each vector to its nearest centroid (squared L2).
    pub fn assign_clusters(&self, vectors: &[f32], num_vectors: usize) -> Vec<usize> {
        (0..num_vectors)
            .map(|i| self.assign(self.row(vectors, i)))
            .collect()
    }

    /// Nearest centroid for one vector.
    pub fn assign(&self, vector: &[f32]) -> usize {
        let mut best = 0;
        let mut best_dist = f32::INFINITY;
        for (idx, c) in self.centroids.iter().enumerate() {
            let d = simd::l2_distance_squared(vector, c);
            if d < best_dist {
                best_dist = d;
                best = idx;
            }
        }
        best
    }

    fn update_centroids(
        &self,
        vectors: &[f32],
        num_vectors: usize,
        assignments: &[usize],
    ) -> Vec<Vec<f32>> {
        let mut sums = vec![vec![0.0f32; self.dimension]; self.centroids.len()];
        let mut counts = vec![0usize; self.centroids.len()];

        for (i, &c) in assignments.iter().enumerate().take(num_vectors) {
            counts[c] += 1;
            for (s, &v) in sums[c].iter_mut().zip(self.row(vectors, i)) {
                *s += v;
            }
        }

        sums.into_iter()
            .enumerate()
            .map(|(c, mut sum)| {
                if counts[c] == 0 {
                    // Empty cluster keeps its previous centroid.
                    self.centroids[c].clone()
                } else {
                    for s in &mut sum {
                        *s /= counts[c] as f32;
                    }
                    sum
                }
            })
            .collect()
    }

    /// Trained centroids.
    pub fn centroids(&self) -> &[Vec<f32>] {
        &self.centroids
    }

    #[inline]
    fn row<'a>(&self, vectors: &'a [f32], idx: usize) -> &'a [f32] {
        &vectors[idx * self.dimension..(idx + 1) * self.dimension]
    }
}
