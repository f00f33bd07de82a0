//! Error types for bugrag.
//!
//! Fatal conditions get their own variant; recovered conditions (malformed
//! test lists, empty retrieval, empty model output) are handled locally and
//! never surface here.

use thiserror::Error;

/// Result type alias for bugrag operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in bugrag operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing credential or invalid configuration value. Raised at
    /// startup, before any network call.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required dataset field is absent from a raw row. Identifiers and
    /// patches are never silently defaulted.
    #[error("missing required field `{field}` in row {row}")]
    MissingField { field: &'static str, row: String },

    /// Embedding or LLM provider failure. `retryable` distinguishes
    /// rate-limit/network conditions (already retried with backoff before
    /// surfacing) from hard client errors.
    #[error("{provider} error: {message}")]
    Provider {
        provider: &'static str,
        message: String,
        retryable: bool,
    },

    /// Failure loading raw rows from the dataset source.
    #[error("dataset error: {0}")]
    Dataset(String),

    /// Vector store failure.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
