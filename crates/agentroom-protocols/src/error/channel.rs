//! Channel errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Recovery failed: {0}")]
    RecoveryFailed(String),

    #[error("Channel not started: {0}")]
    NotStarted(String),

    #[error("Channel already started: {0}")]
    AlreadyStarted(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limited: retry after {retry_after_seconds} seconds")]
    RateLimited { retry_after_seconds: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
