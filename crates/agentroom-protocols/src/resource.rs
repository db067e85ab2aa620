//! Per-task sandbox resources.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::ResourceError;
use crate::task::TaskId;

/// Prefix of every resource name.
pub const RESOURCE_PREFIX: &str = "sandbox-";

const MAX_SLUG_LEN: usize = 48;

/// Externally managed sandbox backing one task.
///
/// Implementations derive the resource name from the task id with
/// [`resource_name`], so the same task always maps to the same resource
/// across restarts.
#[async_trait]
pub trait ResourceManager: Send + Sync {
    /// Create the resource and return its name.
    async fn create(&self, task_id: &TaskId) -> Result<String, ResourceError>;

    /// Destroy the resource. Destroying an absent resource is not an error.
    async fn destroy(&self, task_id: &TaskId) -> Result<(), ResourceError>;

    /// Whether the resource exists and is running.
    async fn probe_alive(&self, task_id: &TaskId) -> Result<bool, ResourceError>;

    /// Clone `url` into the resource's workspace unless a clone is already
    /// there. Managers without a workspace accept and ignore it.
    async fn checkout(&self, _task_id: &TaskId, _url: &str) -> Result<(), ResourceError> {
        Ok(())
    }
}

/// Deterministic resource name for a task.
///
/// The readable part keeps `[A-Za-z0-9_.-]` and replaces everything else
/// with `-`. Different ids can collapse to the same slug (`a:b` and `a/b`),
/// so a short digest of the raw id is always appended.
pub fn resource_name(task_id: &TaskId) -> String {
    let sanitized: String = task_id
        .as_str()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();

    let mut slug = sanitized.trim_matches('-');
    if slug.len() > MAX_SLUG_LEN {
        slug = slug[..MAX_SLUG_LEN].trim_end_matches('-');
    }
    let slug = if slug.is_empty() { "task" } else { slug };

    let digest = hex::encode(Sha256::digest(task_id.as_str().as_bytes()));
    format!("{}{}-{}", RESOURCE_PREFIX, slug, &digest[..8])
}
