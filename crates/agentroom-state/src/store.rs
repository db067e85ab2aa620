//! State storage.

use std::path::{Path, PathBuf};

use agentroom_protocols::{Conversation, TaskId};
use parking_lot::Mutex;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::StateError;
use crate::record::PersistedRecord;

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

/// Owner of the persisted record.
///
/// Mutations only touch memory; [`StateStore::save`] writes the whole
/// record to disk. The file on disk is never partially written: the
/// snapshot goes to `<path>.tmp` in the same directory, is flushed, and is
/// then renamed over `<path>`.
pub struct StateStore {
    path: PathBuf,
    record: Mutex<PersistedRecord>,
    write_lock: tokio::sync::Mutex<()>,
}

impl StateStore {
    /// Create a store backed by `path`, starting from an empty record.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            record: Mutex::new(PersistedRecord::default()),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Canonical file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }

    /// Read the record from disk without touching the in-memory state.
    ///
    /// A missing file is a first start and yields an empty record.
    pub async fn load(&self) -> Result<PersistedRecord, StateError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No state file at {:?}, starting empty", self.path);
                return Ok(PersistedRecord::default());
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&bytes).map_err(|e| StateError::Corrupt {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Move the file on disk aside to `<path>.corrupt` so the next save
    /// does not overwrite it. Returns the new location.
    pub async fn quarantine(&self) -> Result<PathBuf, StateError> {
        let _guard = self.write_lock.lock().await;

        let mut aside = self.path.clone().into_os_string();
        aside.push(".corrupt");
        let aside = PathBuf::from(aside);

        fs::rename(&self.path, &aside).await?;
        info!("Moved state file {:?} to {:?}", self.path, aside);
        Ok(aside)
    }

    /// Replace the in-memory record.
    pub fn install(&self, record: PersistedRecord) {
        *self.record.lock() = record;
    }

    /// Copy of the in-memory record.
    pub fn snapshot(&self) -> PersistedRecord {
        self.record.lock().clone()
    }

    /// Atomically write the current in-memory record to disk.
    pub async fn save(&self) -> Result<(), StateError> {
        let _guard = self.write_lock.lock().await;

        let json = {
            let record = self.record.lock();
            serde_json::to_vec_pretty(&*record)?
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp = self.tmp_path();
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp, &self.path).await?;
        debug!("Saved state to {:?} ({} bytes)", self.path, json.len());
        Ok(())
    }

    /// Resource name recorded for `task_id`.
    pub fn resource(&self, task_id: &TaskId) -> Option<String> {
        self.record.lock().containers.get(task_id).cloned()
    }

    /// All recorded resources.
    pub fn resources(&self) -> Vec<(TaskId, String)> {
        self.record
            .lock()
            .containers
            .iter()
            .map(|(id, name)| (id.clone(), name.clone()))
            .collect()
    }

    pub fn record_resource(&self, task_id: &TaskId, name: impl Into<String>) {
        let name = name.into();
        info!("Recorded resource {} for {}", name, task_id);
        self.record.lock().containers.insert(task_id.clone(), name);
    }

    /// Forget the task's resource and conversation.
    pub fn remove_task(&self, task_id: &TaskId) -> Option<String> {
        self.record.lock().remove(task_id)
    }

    /// Conversation of `task_id`, empty if none is stored.
    pub fn conversation(&self, task_id: &TaskId) -> Conversation {
        self.record
            .lock()
            .history
            .get(task_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Store the conversation of `task_id`.
    ///
    /// Ignored when the task has no recorded resource, so a late write from
    /// an in-flight worker cannot resurrect a task that was already cleaned
    /// up. Returns whether the conversation was stored.
    pub fn set_conversation(&self, task_id: &TaskId, conversation: Conversation) -> bool {
        let mut record = self.record.lock();
        if !record.containers.contains_key(task_id) {
            debug!("Discarding conversation for released task {}", task_id);
            return false;
        }
        record.history.insert(task_id.clone(), conversation);
        true
    }
}
