//! Error types for the segmentation pipeline.
//!
//! Hard failures abort a run before any store mutation. Non-fatal
//! conditions (non-convergence, undefined metrics) are not errors; they are
//! reported as [`crate::Notice`] values inside the run report.

use thiserror::Error;

/// Errors raised by the pipeline stages and their collaborators.
#[derive(Debug, Error)]
pub enum SegmentationError {
    /// Input records failed validation (missing columns, duplicate or
    /// non-positive CustomerID, non-finite numbers, empty dataset).
    #[error("Validation error: {reason}")]
    Validation {
        /// What was wrong with the input
        reason: String,
    },

    /// A feature has no spread, so its scale factor is undefined.
    #[error("Feature '{feature}' is degenerate: {reason}")]
    DegenerateFeature {
        /// Name of the offending feature column
        feature: String,
        /// Which statistic collapsed
        reason: String,
    },

    /// k is zero or larger than the number of distinct feature vectors.
    #[error("Invalid cluster count k={k}: must be between 1 and {distinct} (distinct points)")]
    InvalidClusterCount {
        /// Requested number of clusters
        k: usize,
        /// Number of distinct feature vectors available
        distinct: usize,
    },

    /// Invalid run parameters.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A model was used before `fit()`.
    #[error("{0} not fitted. Call fit() first.")]
    NotFitted(&'static str),

    /// Input matrix shape does not match what the model was fitted on.
    #[error("Shape mismatch: {0}")]
    Shape(String),

    /// The result store could not be read or replaced.
    #[error("Store error: {0}")]
    Store(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SegmentationError {
    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        SegmentationError::Validation {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SegmentationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SegmentationError::InvalidClusterCount { k: 7, distinct: 3 };
        assert_eq!(
            err.to_string(),
            "Invalid cluster count k=7: must be between 1 and 3 (distinct points)"
        );

        let err = SegmentationError::validation("duplicate CustomerID 4");
        assert_eq!(err.to_string(), "Validation error: duplicate CustomerID 4");
    }

    #[test]
    fn test_io_error_converts() {
        fn open_missing() -> Result<std::fs::File> {
            Ok(std::fs::File::open("/definitely/not/here.csv")?)
        }
        assert!(matches!(open_missing(), Err(SegmentationError::Io(_))));
    }
}
