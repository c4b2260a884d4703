use crate::index::CollectionKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RoamerError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid call: {0}")]
    InvalidCall(String),

    #[error("{0} index not loaded; load the index directory first")]
    NotInitialized(CollectionKind),

    #[error("Embedding provider error: {0}")]
    Provider(String),

    #[error("Embedding provider returned HTTP {status}: {body}")]
    ProviderStatus { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    #[error("Degenerate embedding: {0}")]
    DegenerateEmbedding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RoamerError {
    /// Shorthand used by argument validation paths.
    pub fn invalid_call(msg: impl Into<String>) -> Self {
        RoamerError::InvalidCall(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, RoamerError>;
