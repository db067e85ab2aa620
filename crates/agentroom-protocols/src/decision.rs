//! Decision loop protocol.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::channel::ChannelAdapter;
use crate::error::DecisionError;
use crate::task::{Conversation, TaskId};

/// Black-box worker invoked once per queued message.
///
/// The loop may append to `conversation`; the caller persists it after
/// the call returns, whether it succeeded or not.
#[async_trait]
pub trait DecisionLoop: Send + Sync {
    async fn handle(
        &self,
        task_id: &TaskId,
        message: &str,
        system_prompt: &str,
        conversation: &mut Conversation,
        updates: &Updates,
    ) -> Result<String, DecisionError>;
}

/// Forwards intermediate output of a decision loop to the owning channel.
#[derive(Clone)]
pub struct Updates {
    channel: Arc<dyn ChannelAdapter>,
    task_id: TaskId,
}

impl Updates {
    pub fn new(channel: Arc<dyn ChannelAdapter>, task_id: TaskId) -> Self {
        Self { channel, task_id }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Send one update. Failures are logged and swallowed.
    pub async fn send(&self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        if let Err(e) = self.channel.send_update(&self.task_id, text).await {
            debug!(
                "Dropped update for {} on channel {}: {}",
                self.task_id,
                self.channel.id(),
                e
            );
        }
    }
}
