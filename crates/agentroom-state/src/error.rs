//! State errors.

use thiserror::Error;

/// State error types.
#[derive(Debug, Error)]
pub enum StateError {
    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The state file exists but cannot be parsed.
    #[error("Corrupt state file {path}: {message}")]
    Corrupt { path: String, message: String },
}
