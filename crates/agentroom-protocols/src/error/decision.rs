//! Decision loop errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    #[error("Decision loop panicked")]
    Panicked,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
