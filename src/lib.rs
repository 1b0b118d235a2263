//! trivar: variance-tiered hybrid quantization for inner-product search.
//!
//! Embedding dimensions are not equally informative. trivar measures the
//! training-time variance of every feature and routes each one to the
//! cheapest tier that preserves it:
//!
//! | Tier | Features | Storage | Distance |
//! |------|----------|---------|----------|
//! | PQ | high variance | 1 byte/feature (8-bit codebook) | asymmetric inner product |
//! | ITQ | mid variance | 1 bit/feature (learned rotation) | `d - 2h` from Hamming `h` |
//! | discarded | low variance | none | none |
//!
//! A stored vector becomes one hybrid code, `[pq bytes][itq bytes]`, and
//! candidates are ranked by the fused score
//! `pq_multiplier * pq + itq` (larger is better).
//!
//! Two index variants implement the same [`VectorIndex`] interface:
//!
//! - [`FlatHybridIndex`]: scores every stored code per query. Exact fused
//!   ranking, O(ntotal) per query.
//! - [`IvfHybridIndex`]: coarse k-means partition; scores only codes in
//!   the query's `nprobe` best clusters.
//!
//! ```rust
//! use trivar::{FlatHybridIndex, HybridParams, VectorIndex};
//!
//! let mut index = FlatHybridIndex::new(6, HybridParams::default())?;
//! # let vectors = vec![0.0f32; 6 * 100];
//! index.train(100, &vectors)?;
//! index.add(100, &vectors)?;
//! let hits = index.search(1, &vectors[..6], 3)?;
//! assert_eq!(hits.labels.len(), 3);
//! # Ok::<(), trivar::IndexError>(())
//! ```
//!
//! One index instance is single-writer: callers serialize mutation
//! externally; searches on a quiescent index are freely shareable.

pub mod classify;
pub mod diagnostics;
pub mod error;
pub mod filter;
pub mod hybrid;
pub mod index;
pub mod itq;
pub mod kmeans;
pub mod pq;
pub mod simd;

pub use classify::{classify_features, FeatureClassification};
pub use diagnostics::{EventSink, IndexEvent};
pub use error::{IndexError, Result};
pub use hybrid::{FlatHybridIndex, HybridCodec, HybridParams, IvfHybridIndex, TierScorer};
pub use index::{SearchResult, VectorIndex, NO_RESULT};
