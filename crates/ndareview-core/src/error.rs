use std::time::Duration;

use thiserror::Error;

/// Failures surfaced by the review pipeline.
///
/// A suggestion that fails validation is not an error: it travels through the
/// pipeline tagged with `needs_review`.
#[derive(Debug, Error)]
pub enum ReviewError {
    /// Unknown document, review record, or model artifact.
    #[error("not found: {0}")]
    NotFound(String),

    /// Classifier weights are not loaded or the inference backend is unreachable.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// Only raised when truncation is disabled by configuration.
    #[error("input too long: {tokens} tokens exceeds limit of {max_length}")]
    InputTooLong { tokens: usize, max_length: usize },

    #[error("mismatched training data: {0}")]
    MismatchedTrainingData(String),

    #[error("malformed document: {0}")]
    MalformedDocument(String),

    #[error("inference timed out after {0:?}")]
    Timeout(Duration),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

pub type Result<T> = std::result::Result<T, ReviewError>;
