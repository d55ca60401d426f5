//! Error taxonomy for the analysis pipeline
//!
//! Degenerate clusters (no variance in treatment or outcome) are deliberately
//! absent here: they are omitted from the statistics table instead of raised.

use thiserror::Error;

/// Errors for natural-experiment analysis operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VaineError {
    #[error("Insufficient data: need at least {required} samples, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("No valid clusters for outcome '{outcome}'")]
    NoValidClusters { outcome: String },

    #[error("Malformed merge tree: {0}")]
    MalformedTree(String),

    #[error("Column filter '{pattern}' matched no columns")]
    AmbiguousColumnFilter { pattern: String },

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Invalid column pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("Non-finite feature at row {row}, column {column}")]
    NonFiniteFeature { row: usize, column: usize },

    #[error("Invalid table: {0}")]
    InvalidTable(String),

    #[error("Embedding failed: {0}")]
    EmbeddingError(String),

    #[error("Clustering failed: {0}")]
    ClusteringError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, VaineError>;

/// First NaN or infinite cell of a row-major matrix
pub(crate) fn check_finite(rows: &[Vec<f64>]) -> Result<()> {
    for (row, values) in rows.iter().enumerate() {
        if let Some(column) = values.iter().position(|v| !v.is_finite()) {
            return Err(VaineError::NonFiniteFeature { row, column });
        }
    }
    Ok(())
}
