//! # agentroom Channel - GitHub
//!
//! Turns labeled GitHub issues into tasks. Issues arrive through a signed
//! webhook; results and errors go back as issue comments. The repository
//! is cloned into the task's sandbox before the agent runs.
//!
//! Task ids have the form `github:<owner/repo>#<number>`.

mod api;
mod channel;
mod error;
mod webhook;

pub use api::{Comment, GitHubApi, Issue, Label};
pub use channel::GitHubChannel;
pub use error::GitHubError;
pub use webhook::{IssueTask, WebhookState, create_router, parse_issue_event, verify_signature};

use agentroom_protocols::TaskId;

/// Task id scheme of this channel.
pub const SCHEME: &str = "github";

pub fn issue_task_id(repo: &str, number: u64) -> TaskId {
    TaskId::namespaced(SCHEME, format!("{}#{}", repo, number))
}

/// Repository and issue number of a GitHub task id.
pub fn parse_issue_task_id(task_id: &TaskId) -> Option<(&str, u64)> {
    if task_id.scheme() != Some(SCHEME) {
        return None;
    }
    let (repo, number) = task_id.key().rsplit_once('#')?;
    if !repo.contains('/') {
        return None;
    }
    Some((repo, number.parse().ok()?))
}
