//! Task sink handed to started channels.

use std::sync::Arc;

use agentroom_protocols::{ChannelAdapter, TaskId, TaskSink};

use crate::registry::TaskRegistry;

/// Submits a channel's inbound events to the registry under that channel.
pub struct ChannelSink {
    registry: Arc<TaskRegistry>,
    channel: Arc<dyn ChannelAdapter>,
}

impl ChannelSink {
    pub fn new(registry: Arc<TaskRegistry>, channel: Arc<dyn ChannelAdapter>) -> Self {
        Self { registry, channel }
    }
}

impl TaskSink for ChannelSink {
    fn submit(&self, task_id: TaskId, message: String) {
        self.registry.enqueue(task_id, message, self.channel.clone());
    }

    fn is_processing(&self, task_id: &TaskId) -> bool {
        self.registry.is_processing(task_id)
    }

    fn backlog(&self, task_id: &TaskId) -> usize {
        self.registry.backlog(task_id)
    }
}
