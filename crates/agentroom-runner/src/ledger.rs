//! Resource lifecycle paired with the persisted record.

use std::sync::Arc;

use agentroom_protocols::{Conversation, ResourceManager, TaskId};
use agentroom_state::StateStore;
use tracing::{debug, info, warn};

use crate::error::RunnerError;

/// Creates and destroys sandboxes, recording every change in the
/// [`StateStore`] and saving it before returning.
pub struct ResourceLedger {
    resources: Arc<dyn ResourceManager>,
    state: Arc<StateStore>,
}

impl ResourceLedger {
    pub fn new(resources: Arc<dyn ResourceManager>, state: Arc<StateStore>) -> Self {
        Self { resources, state }
    }

    pub fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    pub fn resources(&self) -> &Arc<dyn ResourceManager> {
        &self.resources
    }

    /// Make sure `task_id` has a resource. Returns `true` if one was created.
    pub async fn ensure(&self, task_id: &TaskId) -> Result<bool, RunnerError> {
        if let Some(name) = self.state.resource(task_id) {
            debug!("Reusing resource {} for {}", name, task_id);
            return Ok(false);
        }

        let name = self.resources.create(task_id).await?;
        self.state.record_resource(task_id, name);
        self.state.save().await?;
        Ok(true)
    }

    /// Destroy the task's resource and forget it.
    ///
    /// Tasks without a recorded resource are left alone. If the runtime
    /// refuses to destroy the resource its entry is kept so the next
    /// startup sweep retries it.
    pub async fn release(&self, task_id: &TaskId) -> Result<(), RunnerError> {
        let Some(name) = self.state.resource(task_id) else {
            debug!("No resource recorded for {}", task_id);
            return Ok(());
        };

        match self.resources.destroy(task_id).await {
            Ok(()) => {
                self.state.remove_task(task_id);
                self.state.save().await?;
                info!("Released resource {} for {}", name, task_id);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to destroy {} for {}: {}", name, task_id, e);
                Err(e.into())
            }
        }
    }

    /// Store the task's conversation and persist it.
    ///
    /// A no-op once the task's resource has been released.
    pub async fn commit_conversation(
        &self,
        task_id: &TaskId,
        conversation: Conversation,
    ) -> Result<(), RunnerError> {
        if self.state.set_conversation(task_id, conversation) {
            self.state.save().await?;
        }
        Ok(())
    }
}
