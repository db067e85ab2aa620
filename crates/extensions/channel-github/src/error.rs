//! GitHub channel errors.

use agentroom_protocols::ChannelError;
use thiserror::Error;

/// Seconds to back off when GitHub rate limits without saying for how long.
const DEFAULT_RETRY_AFTER: u64 = 60;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GitHub API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Not a GitHub issue task: {0}")]
    NotAnIssue(String),

    #[error("Missing configuration: {0}")]
    MissingConfig(&'static str),
}

impl From<GitHubError> for ChannelError {
    fn from(err: GitHubError) -> Self {
        match err {
            GitHubError::Http(e) => ChannelError::ConnectionFailed(e.to_string()),
            GitHubError::Status {
                status: 401 | 403,
                body,
            } => ChannelError::AuthenticationFailed(body),
            GitHubError::Status { status: 429, .. } => ChannelError::RateLimited {
                retry_after_seconds: DEFAULT_RETRY_AFTER,
            },
            other => ChannelError::SendFailed(other.to_string()),
        }
    }
}
