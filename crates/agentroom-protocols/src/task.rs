//! Task identity and recovery types.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Conversation state of one task.
///
/// Entries are opaque to the orchestrator; only the decision loop interprets
/// them.
pub type Conversation = Vec<Value>;

/// Stable, channel-namespaced identifier of one unit of work.
///
/// The form is `<scheme>:<key>`, e.g. `github:owner/repo#7` or
/// `matrix:!room:server`. The id survives restarts and keys both the
/// registry and the persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Wrap an already namespaced id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build an id from a channel scheme and a channel-local key.
    pub fn namespaced(scheme: &str, key: impl AsRef<str>) -> Self {
        Self(format!("{}:{}", scheme, key.as_ref()))
    }

    /// The channel scheme, if the id is namespaced.
    pub fn scheme(&self) -> Option<&str> {
        self.0.split_once(':').map(|(scheme, _)| scheme)
    }

    /// The channel-local part of the id.
    pub fn key(&self) -> &str {
        self.0.split_once(':').map(|(_, key)| key).unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A task a channel still owns after a restart.
///
/// With a message the task is resumed by enqueueing it; without one it is
/// only pre-registered so its sandbox survives the orphan sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredClaim {
    pub task_id: TaskId,
    pub message: Option<String>,
}

impl RecoveredClaim {
    /// Claim a task and resume it with `message`.
    pub fn resume(task_id: impl Into<TaskId>, message: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            message: Some(message.into()),
        }
    }

    /// Claim a task without any pending work.
    pub fn keep(task_id: impl Into<TaskId>) -> Self {
        Self {
            task_id: task_id.into(),
            message: None,
        }
    }
}
