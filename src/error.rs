//! Error types for Strata.
//!
//! Tool calls never surface these directly: the memory service folds them
//! into the `error` field of the tool response. They reach the caller of
//! `AppState::new` and the stdio loop as plain `Result`s.

use strata_models::ValidationError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Validation errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    // Collaborator errors
    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    // Startup errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

// Convenience conversions
impl From<strata_qdrant::Error> for Error {
    fn from(err: strata_qdrant::Error) -> Self {
        match err {
            strata_qdrant::Error::VectorStore(message) => Self::VectorStore(message),
            other => Self::VectorStore(other.to_string()),
        }
    }
}

impl From<strata_embeddings::Error> for Error {
    fn from(err: strata_embeddings::Error) -> Self {
        Self::Embedding(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {}", err))
    }
}
