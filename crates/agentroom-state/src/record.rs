//! On-disk record layout.

use std::collections::BTreeMap;

use agentroom_protocols::{Conversation, TaskId};
use serde::{Deserialize, Serialize};

/// Everything that survives a restart.
///
/// Serialized as one JSON object with two maps:
///
/// ```json
/// {
///   "containers": { "github:owner/repo#7": "sandbox-github-owner-repo-7-1a2b3c4d" },
///   "history":    { "github:owner/repo#7": [ { "role": "user", "content": "..." } ] }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    /// Task id to resource name.
    #[serde(default)]
    pub containers: BTreeMap<TaskId, String>,

    /// Task id to conversation state.
    #[serde(default)]
    pub history: BTreeMap<TaskId, Conversation>,
}

impl PersistedRecord {
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty() && self.history.is_empty()
    }

    /// Forget a task entirely. Returns its resource name, if any.
    pub fn remove(&mut self, task_id: &TaskId) -> Option<String> {
        self.history.remove(task_id);
        self.containers.remove(task_id)
    }

    /// Drop conversations that no longer have a resource.
    pub fn prune_history(&mut self) -> usize {
        let before = self.history.len();
        let containers = &self.containers;
        self.history.retain(|task_id, _| containers.contains_key(task_id));
        before - self.history.len()
    }
}
