//! Resource errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Failed to create resource {name}: {message}")]
    CreateFailed { name: String, message: String },

    #[error("Failed to destroy resource {name}: {message}")]
    DestroyFailed { name: String, message: String },

    #[error("Checkout failed in {name}: {message}")]
    CheckoutFailed { name: String, message: String },

    #[error("Probe failed for {name}: {message}")]
    ProbeFailed { name: String, message: String },

    #[error("Runtime command timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
