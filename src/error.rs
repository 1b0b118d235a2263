//! Error types for trivar.

use thiserror::Error;

/// Errors that can occur during index construction, training, and search.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndexError {
    /// Invalid parameter value (construction-time or per-call).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Operation requires a trained index.
    #[error("index must be trained before this operation")]
    NotTrained,

    /// Input buffer does not match the expected row-major layout.
    #[error("dimension mismatch: expected {expected} values, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Label outside the stored range.
    #[error("label {0} is out of range")]
    LabelOutOfRange(i64),
}

pub type Result<T> = std::result::Result<T, IndexError>;
