//! Task registry.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use agentroom_protocols::{ChannelAdapter, DecisionLoop, TaskId};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::RunnerError;
use crate::ledger::ResourceLedger;
use crate::worker::TaskWorker;

struct TaskEntry {
    channel: Arc<dyn ChannelAdapter>,
    sender: UnboundedSender<String>,
    /// Messages queued or in progress.
    backlog: Arc<AtomicUsize>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// In-memory table of task id to queue, worker and owning channel.
///
/// A task is "processing" while it has an entry here. Every entry owns
/// exactly one worker and one queue.
pub struct TaskRegistry {
    tasks: Mutex<HashMap<TaskId, TaskEntry>>,
    ledger: Arc<ResourceLedger>,
    decider: Arc<dyn DecisionLoop>,
    workers_spawned: AtomicU64,
}

impl TaskRegistry {
    pub fn new(ledger: Arc<ResourceLedger>, decider: Arc<dyn DecisionLoop>) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            ledger,
            decider,
            workers_spawned: AtomicU64::new(0),
        }
    }

    pub fn ledger(&self) -> &Arc<ResourceLedger> {
        &self.ledger
    }

    /// Queue `message` for `task_id`, spawning its worker on first use.
    ///
    /// Never blocks. The channel is only recorded when the task is first
    /// seen; later calls keep the original owner.
    pub fn enqueue(&self, task_id: TaskId, message: String, channel: Arc<dyn ChannelAdapter>) {
        let mut tasks = self.tasks.lock();
        self.ensure_worker(&mut tasks, &task_id, channel);

        if let Some(entry) = tasks.get(&task_id) {
            entry.backlog.fetch_add(1, Ordering::SeqCst);
            if entry.sender.send(message).is_err() {
                entry.backlog.fetch_sub(1, Ordering::SeqCst);
                warn!("Worker for {} exited before the message was queued", task_id);
            }
        }
    }

    /// Register `task_id` with an idle worker and no pending message.
    ///
    /// No-op if the task is already registered.
    pub fn pre_register(&self, task_id: TaskId, channel: Arc<dyn ChannelAdapter>) {
        let mut tasks = self.tasks.lock();
        self.ensure_worker(&mut tasks, &task_id, channel);
    }

    fn ensure_worker(
        &self,
        tasks: &mut HashMap<TaskId, TaskEntry>,
        task_id: &TaskId,
        channel: Arc<dyn ChannelAdapter>,
    ) {
        let channel = match tasks.get(task_id) {
            Some(entry) if !entry.handle.is_finished() => {
                if entry.channel.id() != channel.id() {
                    debug!(
                        "Task {} stays on channel {}, ignoring {}",
                        task_id,
                        entry.channel.id(),
                        channel.id()
                    );
                }
                return;
            }
            Some(entry) => {
                warn!("Worker for {} died, spawning a replacement", task_id);
                entry.channel.clone()
            }
            None => channel,
        };

        let entry = self.spawn_worker(task_id.clone(), channel);
        tasks.insert(task_id.clone(), entry);
    }

    fn spawn_worker(&self, task_id: TaskId, channel: Arc<dyn ChannelAdapter>) -> TaskEntry {
        let (sender, receiver) = mpsc::unbounded_channel();
        let backlog = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let worker = TaskWorker::new(
            task_id.clone(),
            channel.clone(),
            self.ledger.clone(),
            self.decider.clone(),
            backlog.clone(),
        );
        let handle = tokio::spawn(worker.run(receiver, cancel.clone()));

        let total = self.workers_spawned.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "Spawned worker for {} on channel {} ({} total)",
            task_id,
            channel.id(),
            total
        );

        TaskEntry {
            channel,
            sender,
            backlog,
            cancel,
            handle,
        }
    }

    /// Stop the task's worker, drop its queue and destroy its resource.
    ///
    /// A message already being processed runs to completion; its
    /// conversation write-back is discarded.
    pub async fn cleanup(&self, task_id: &TaskId) -> Result<(), RunnerError> {
        let entry = self.tasks.lock().remove(task_id);
        match entry {
            Some(entry) => {
                entry.cancel.cancel();
                info!("Cancelled worker for {}", task_id);
            }
            None => debug!("Cleanup of unregistered task {}", task_id),
        }

        self.ledger.release(task_id).await
    }

    /// Cancel every worker without touching resources, so that they can be
    /// reattached on the next start.
    pub fn shutdown(&self) {
        let entries: Vec<_> = self.tasks.lock().drain().collect();
        for (task_id, entry) in &entries {
            entry.cancel.cancel();
            debug!("Stopped worker for {}", task_id);
        }
        info!("Registry shut down ({} workers stopped)", entries.len());
    }

    pub fn is_processing(&self, task_id: &TaskId) -> bool {
        self.tasks.lock().contains_key(task_id)
    }

    /// Snapshot of every processing task id.
    pub fn processing(&self) -> BTreeSet<TaskId> {
        self.tasks.lock().keys().cloned().collect()
    }

    /// Snapshot of every task with its owning channel.
    pub fn tracked(&self) -> Vec<(TaskId, Arc<dyn ChannelAdapter>)> {
        self.tasks
            .lock()
            .iter()
            .map(|(id, entry)| (id.clone(), entry.channel.clone()))
            .collect()
    }

    /// Messages of `task_id` that are queued or being processed.
    pub fn backlog(&self, task_id: &TaskId) -> usize {
        self.tasks
            .lock()
            .get(task_id)
            .map_or(0, |entry| entry.backlog.load(Ordering::SeqCst))
    }

    /// Whether the task's worker is still running.
    pub fn worker_alive(&self, task_id: &TaskId) -> bool {
        self.tasks
            .lock()
            .get(task_id)
            .is_some_and(|entry| !entry.handle.is_finished())
    }

    pub fn channel_of(&self, task_id: &TaskId) -> Option<Arc<dyn ChannelAdapter>> {
        self.tasks.lock().get(task_id).map(|entry| entry.channel.clone())
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Number of workers spawned since creation.
    pub fn workers_spawned(&self) -> u64 {
        self.workers_spawned.load(Ordering::SeqCst)
    }
}
