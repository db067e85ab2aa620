//! Channel protocol definitions.
//!
//! A channel is the boundary between the orchestrator and one transport
//! (a Matrix homeserver, GitHub issues, ...). The core only talks to the
//! transport through [`ChannelAdapter`].
//!
//! ## Lifecycle
//!
//! 1. [`ChannelAdapter::connect`] brings the transport up far enough to
//!    answer membership questions, without dispatching any event.
//! 2. [`ChannelAdapter::recover_tasks`] reports work the channel still owns
//!    after a restart.
//! 3. [`ChannelAdapter::start`] hands the channel a [`TaskSink`]. Only from
//!    this point on can it submit live events, so recovery always completes
//!    before any inbound port opens.
//! 4. [`ChannelAdapter::stop`] tears the transport down.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::task::{RecoveredClaim, TaskId};

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;

/// Adapter between the orchestrator and a transport.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Unique channel identifier, used in logs.
    fn id(&self) -> &str;

    /// System prompt handed to the decision loop for this channel's tasks.
    fn system_prompt(&self) -> &str;

    /// Relay intermediate output. Best effort; may be a no-op.
    async fn send_update(&self, task_id: &TaskId, text: &str) -> Result<(), ChannelError>;

    /// Deliver the terminal output of one message.
    async fn deliver_result(&self, task_id: &TaskId, text: &str) -> Result<(), ChannelError>;

    /// Report a failure of one message.
    async fn deliver_error(&self, task_id: &TaskId, error: &str) -> Result<(), ChannelError>;

    /// Whether the task's external context (room membership, open issue)
    /// still exists. Called periodically; must be cheap enough for that.
    async fn is_valid(&self, task_id: &TaskId) -> bool;

    /// Bring the transport up without dispatching events.
    async fn connect(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    /// Work this channel still owns after a restart.
    async fn recover_tasks(&self) -> Result<Vec<RecoveredClaim>, ChannelError> {
        Ok(Vec::new())
    }

    /// Git repository to clone into the task's sandbox before each message
    /// is handled. `None` when the task works in an empty workspace.
    fn checkout_url(&self, _task_id: &TaskId) -> Option<String> {
        None
    }

    /// Begin accepting inbound events, submitting them through `sink`.
    async fn start(&self, sink: Arc<dyn TaskSink>) -> Result<(), ChannelError>;

    /// Stop accepting inbound events.
    async fn stop(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

/// Handle through which a started channel feeds the task registry.
pub trait TaskSink: Send + Sync {
    /// Queue `message` for `task_id`, owned by the channel this sink was
    /// created for. Never blocks.
    fn submit(&self, task_id: TaskId, message: String);

    /// Whether `task_id` currently has a live worker.
    fn is_processing(&self, task_id: &TaskId) -> bool;

    /// Messages of `task_id` queued or in progress.
    fn backlog(&self, _task_id: &TaskId) -> usize {
        0
    }
}
