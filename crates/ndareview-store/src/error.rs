use ndareview_core::ReviewError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] ::duckdb::Error),

    #[error("{0}")]
    Other(String),
}

impl From<StoreError> for ReviewError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ReviewError::NotFound(what),
            StoreError::Io(e) => ReviewError::Io(e),
            StoreError::Json(e) => ReviewError::Serialization(e),
            other => ReviewError::Storage(other.to_string()),
        }
    }
}
