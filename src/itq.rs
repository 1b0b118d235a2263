//! Binary rotation quantization (ITQ) for the mid-variance tier.
//!
//! Learns an orthogonal transform that balances variance across
//! dimensions so that binarizing each rotated coordinate by its sign
//! loses as little as possible: mean-centering, full-rank PCA, then the
//! classic ITQ alternation (binarize, then solve the orthogonal
//! Procrustes problem for the rotation). Codes are one bit per dimension,
//! packed MSB-first, `ceil(d/8)` bytes per vector.
//!
//! Distance semantics: for codes of `d` bits with Hamming distance `h`,
//! the inner-product-distance estimate is `d - 2h`. This is the only
//! similarity this quantizer exposes; there is no Euclidean mode.

use serde::{Deserialize, Serialize};

/// Default number of ITQ rotation-refinement iterations.
pub const DEFAULT_ITQ_ITERS: usize = 50;

/// Seed for the random orthogonal initialization of the ITQ rotation.
const ROTATION_SEED: u64 = 0xb17_0f_b17;

/// Binary rotation quantizer over `d` input dimensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItqQuantizer {
    d: usize,
    iters: usize,
    mean: Vec<f32>,
    /// Combined orthogonal transform (PCA x ITQ rotation), row-major d*d:
    /// `y[j] = sum_i (x[i] - mean[i]) * transform[i*d + j]`.
    transform: Vec<f32>,
    trained: bool,
}

/// Packed code length for `d` bits.
#[inline]
pub const fn code_size_for(d: usize) -> usize {
    if d == 0 {
        0
    } else {
        (d + 7) / 8
    }
}

/// Hamming distance between two packed bit codes.
#[inline]
pub fn hamming(a: &[u8], b: &[u8]) -> u32 {
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

impl ItqQuantizer {
    /// Create an untrained quantizer; `d == 0` is a valid empty quantizer.
    pub fn new(d: usize, iters: usize) -> Self {
        Self {
            d,
            iters,
            mean: vec![0.0; d],
            transform: identity(d),
            trained: false,
        }
    }

    /// Input dimensionality (= number of code bits).
    #[inline]
    pub fn dimension(&self) -> usize {
        self.d
    }

    /// Code length in bytes.
    #[inline]
    pub fn code_size(&self) -> usize {
        code_size_for(self.d)
    }

    /// Fit the rotation from `n` row-major training vectors.
    pub fn train(&mut self, n: usize, x: &[f32]) {
        let d = self.d;
        if d == 0 {
            self.trained = true;
            return;
        }

        self.mean = vec![0.0; d];
        if n == 0 {
            self.transform = identity(d);
            self.trained = true;
            return;
        }

        let mut mean = vec![0.0f64; d];
        for row in x.chunks_exact(d).take(n) {
            for (m, &v) in mean.iter_mut().zip(row) {
                *m += f64::from(v);
            }
        }
        for m in &mut mean {
            *m /= n as f64;
        }
        self.mean = mean.iter().map(|&m| m as f32).collect();

        let mut centered = vec![0.0f32; n * d];
        for (out, row) in centered.chunks_exact_mut(d).zip(x.chunks_exact(d)) {
            for ((o, &v), &m) in out.iter_mut().zip(row).zip(&mean) {
                *o = (f64::from(v) - m) as f32;
            }
        }

        // Full-rank PCA of the covariance.
        let mut cov = vec![0.0f64; d * d];
        for row in centered.chunks_exact(d) {
            for a in 0..d {
                let ra = f64::from(row[a]);
                for b in a..d {
                    cov[a * d + b] += ra * f64::from(row[b]);
                }
            }
        }
        for a in 0..d {
            for b in a..d {
                let v = cov[a * d + b] / n as f64;
                cov[a * d + b] = v;
                cov[b * d + a] = v;
            }
        }

        let (evals, evecs) = jacobi_eigen(cov, d);
        let mut order: Vec<usize> = (0..d).collect();
        order.sort_by(|&a, &b| evals[b].total_cmp(&evals[a]));

        // PCA basis, eigenvector columns sorted by descending eigenvalue.
        let mut w = vec![0.0f64; d * d];
        for (j, &col) in order.iter().enumerate() {
            for i in 0..d {
                w[i * d + j] = evecs[i * d + col];
            }
        }

        // Projected training data.
        let mut v = vec![0.0f32; n * d];
        for (out, row) in v.chunks_exact_mut(d).zip(centered.chunks_exact(d)) {
            for (j, o) in out.iter_mut().enumerate() {
                let mut sum = 0.0f64;
                for (i, &r) in row.iter().enumerate() {
                    sum += f64::from(r) * w[i * d + j];
                }
                *o = sum as f32;
            }
        }

        // ITQ alternation: binarize, then orthogonal Procrustes.
        let mut r = random_orthogonal(d, ROTATION_SEED);
        let mut z = vec![0.0f64; d];
        for _ in 0..self.iters {
            let mut m = vec![0.0f64; d * d];
            for row in v.chunks_exact(d) {
                for (j, zj) in z.iter_mut().enumerate() {
                    let mut sum = 0.0f64;
                    for (i, &ri) in row.iter().enumerate() {
                        sum += f64::from(ri) * r[i * d + j];
                    }
                    *zj = sum;
                }
                for (i, &ri) in row.iter().enumerate() {
                    let ri = f64::from(ri);
                    for (j, &zj) in z.iter().enumerate() {
                        let b = if zj >= 0.0 { 1.0 } else { -1.0 };
                        m[i * d + j] += ri * b;
                    }
                }
            }

            // M = U S Wt; the rotation maximizing tr(Rt M) is U Wt.
            let (u, wv) = thin_svd(&m, d);
            for i in 0..d {
                for j in 0..d {
                    let mut sum = 0.0f64;
                    for k in 0..d {
                        sum += u[i * d + k] * wv[j * d + k];
                    }
                    r[i * d + j] = sum;
                }
            }
        }

        // Combined transform: centering, PCA, rotation.
        let mut transform = vec![0.0f32; d * d];
        for i in 0..d {
            for j in 0..d {
                let mut sum = 0.0f64;
                for k in 0..d {
                    sum += w[i * d + k] * r[k * d + j];
                }
                transform[i * d + j] = sum as f32;
            }
        }
        self.transform = transform;
        self.trained = true;
    }

    /// Whether `train` has run.
    #[inline]
    pub fn is_trained(&self) -> bool {
        self.trained
    }

    /// Encode `n` row-major vectors into packed bit codes, one bit per
    /// rotated dimension, MSB-first within each byte.
    pub fn compute_codes(&self, x: &[f32], n: usize) -> Vec<u8> {
        let d = self.d;
        let cs = self.code_size();
        let mut codes = vec![0u8; n * cs];
        if d == 0 {
            return codes;
        }

        for (code, row) in codes.chunks_exact_mut(cs).zip(x.chunks_exact(d)) {
            for j in 0..d {
                let mut y = 0.0f32;
                for (i, &v) in row.iter().enumerate() {
                    y += (v - self.mean[i]) * self.transform[i * d + j];
                }
                if y >= 0.0 {
                    code[j / 8] |= 1 << (7 - j % 8);
                }
            }
        }

        codes
    }

    /// Decode packed bit codes back to approximate vectors: unpack bits to
    /// +-1 and apply the inverse (transpose) transform plus the mean.
    pub fn decode(&self, codes: &[u8], n: usize) -> Vec<f32> {
        let d = self.d;
        let cs = self.code_size();
        let mut out = vec![0.0f32; n * d];
        if d == 0 {
            return out;
        }

        let mut y = vec![0.0f32; d];
        for (row, code) in out.chunks_exact_mut(d).zip(codes.chunks_exact(cs)) {
            for (j, yj) in y.iter_mut().enumerate() {
                let bit = (code[j / 8] >> (7 - j % 8)) & 1;
                *yj = if bit == 1 { 1.0 } else { -1.0 };
            }
            for (i, slot) in row.iter_mut().enumerate() {
                let mut sum = 0.0f32;
                for (j, &yj) in y.iter().enumerate() {
                    sum += yj * self.transform[i * d + j];
                }
                *slot = sum + self.mean[i];
            }
        }

        out
    }

    /// Inner-product-distance estimate from a precomputed Hamming distance.
    #[inline]
    pub fn ip_from_hamming(&self, hamming_distance: u32) -> f32 {
        self.d as f32 - 2.0 * hamming_distance as f32
    }

    /// Inner-product-distance estimate between two packed codes.
    #[inline]
    pub fn inner_product_distance(&self, a: &[u8], b: &[u8]) -> f32 {
        self.ip_from_hamming(hamming(a, b))
    }
}

fn identity(d: usize) -> Vec<f32> {
    let mut m = vec![0.0f32; d * d];
    for i in 0..d {
        m[i * d + i] = 1.0;
    }
    m
}

/// Cyclic Jacobi eigen decomposition of a symmetric matrix.
///
/// Returns the eigenvalues and the eigenvector matrix (eigenvector j in
/// column j), unsorted.
fn jacobi_eigen(mut a: Vec<f64>, d: usize) -> (Vec<f64>, Vec<f64>) {
    let mut v = vec![0.0f64; d * d];
    for i in 0..d {
        v[i * d + i] = 1.0;
    }

    for _sweep in 0..100 {
        let mut off = 0.0f64;
        for p in 0..d {
            for q in (p + 1)..d {
                off += a[p * d + q] * a[p * d + q];
            }
        }
        if off < 1e-20 {
            break;
        }

        for p in 0..d {
            for q in (p + 1)..d {
                let apq = a[p * d + q];
                if apq.abs() < 1e-300 {
                    continue;
                }

                let theta = (a[q * d + q] - a[p * d + p]) / (2.0 * apq);
                let t = if theta == 0.0 {
                    1.0
                } else {
                    theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt())
                };
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for i in 0..d {
                    let aip = a[i * d + p];
                    let aiq = a[i * d + q];
                    a[i * d + p] = c * aip - s * aiq;
                    a[i * d + q] = s * aip + c * aiq;
                }
                for j in 0..d {
                    let apj = a[p * d + j];
                    let aqj = a[q * d + j];
                    a[p * d + j] = c * apj - s * aqj;
                    a[q * d + j] = s * apj + c * aqj;
                }
                for i in 0..d {
                    let vip = v[i * d + p];
                    let viq = v[i * d + q];
                    v[i * d + p] = c * vip - s * viq;
                    v[i * d + q] = s * vip + c * viq;
                }
            }
        }
    }

    let evals = (0..d).map(|i| a[i * d + i]).collect();
    (evals, v)
}

/// SVD of a square matrix via the eigen decomposition of `Mt M`.
///
/// Returns `(U, W)` with `M = U S Wt`, both with their columns sorted by
/// descending singular value; columns of `U` belonging to zero singular
/// values are completed to an orthonormal basis.
fn thin_svd(m: &[f64], d: usize) -> (Vec<f64>, Vec<f64>) {
    let mut mtm = vec![0.0f64; d * d];
    for a in 0..d {
        for b in a..d {
            let mut sum = 0.0f64;
            for i in 0..d {
                sum += m[i * d + a] * m[i * d + b];
            }
            mtm[a * d + b] = sum;
            mtm[b * d + a] = sum;
        }
    }

    let (s2, wv) = jacobi_eigen(mtm, d);
    let mut order: Vec<usize> = (0..d).collect();
    order.sort_by(|&a, &b| s2[b].total_cmp(&s2[a]));

    let mut w = vec![0.0f64; d * d];
    for (j, &col) in order.iter().enumerate() {
        for i in 0..d {
            w[i * d + j] = wv[i * d + col];
        }
    }

    let mut u = vec![0.0f64; d * d];
    for j in 0..d {
        let s = s2[order[j]].max(0.0).sqrt();
        if s > 1e-9 {
            for i in 0..d {
                let mut sum = 0.0f64;
                for k in 0..d {
                    sum += m[i * d + k] * w[k * d + j];
                }
                u[i * d + j] = sum / s;
            }
        } else {
            complete_column(&mut u, d, j);
        }
    }

    (u, w)
}

/// Fill column `j` of `u` with a unit vector orthogonal to columns `0..j`.
fn complete_column(u: &mut [f64], d: usize, j: usize) {
    for axis in 0..d {
        let mut col = vec![0.0f64; d];
        col[axis] = 1.0;

        for prev in 0..j {
            let mut dot = 0.0f64;
            for i in 0..d {
                dot += col[i] * u[i * d + prev];
            }
            for i in 0..d {
                col[i] -= dot * u[i * d + prev];
            }
        }

        let norm = col.iter().map(|c| c * c).sum::<f64>().sqrt();
        if norm > 1e-6 {
            for i in 0..d {
                u[i * d + j] = col[i] / norm;
            }
            return;
        }
    }
}

/// Random orthogonal matrix via seeded Gram-Schmidt.
fn random_orthogonal(d: usize, seed: u64) -> Vec<f64> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut state = seed;
    let mut next_rand = || -> f64 {
        let mut hasher = DefaultHasher::new();
        state.hash(&mut hasher);
        state = hasher.finish();
        (state as f64) / (u64::MAX as f64) * 2.0 - 1.0
    };

    let mut basis: Vec<Vec<f64>> = Vec::with_capacity(d);
    for i in 0..d {
        let mut v: Vec<f64> = (0..d).map(|_| next_rand()).collect();

        for b in &basis {
            let dot: f64 = v.iter().zip(b).map(|(a, b)| a * b).sum();
            for (vi, bi) in v.iter_mut().zip(b) {
                *vi -= dot * bi;
            }
        }

        let norm: f64 = v.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm > 1e-10 {
            for vi in &mut v {
                *vi /= norm;
            }
            basis.push(v);
        } else {
            let mut v = vec![0.0f64; d];
            v[i] = 1.0;
            basis.push(v);
        }
    }

    // Rows of the basis as matrix columns: R[i][j] = basis[j][i].
    let mut r = vec![0.0f64; d * d];
    for (j, row) in basis.iter().enumerate() {
        for (i, &val) in row.iter().enumerate() {
            r[i * d + j] = val;
        }
    }
    r
}
