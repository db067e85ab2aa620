//! Runner errors.

use agentroom_protocols::{ChannelError, ResourceError};
use agentroom_state::StateError;
use thiserror::Error;

/// Runner error types.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Sandbox operation failed.
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    /// Persisted record could not be written.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// A channel refused to start.
    #[error("Channel {channel} failed to start: {source}")]
    ChannelStart {
        channel: String,
        #[source]
        source: ChannelError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_start_error() {
        let err = RunnerError::ChannelStart {
            channel: "github".to_string(),
            source: ChannelError::ConnectionFailed("address in use".to_string()),
        };
        let display = err.to_string();
        assert!(display.contains("github"));
        assert!(display.contains("address in use"));
    }

    #[test]
    fn test_resource_error_from() {
        let err = RunnerError::from(ResourceError::Timeout(15));
        assert!(err.to_string().starts_with("Resource error"));
    }
}
