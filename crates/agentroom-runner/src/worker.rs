//! Per-task worker loop.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use agentroom_protocols::{ChannelAdapter, DecisionError, DecisionLoop, TaskId, Updates};
use futures::FutureExt;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::ledger::ResourceLedger;

/// Drains one task's queue strictly in order.
pub(crate) struct TaskWorker {
    task_id: TaskId,
    channel: Arc<dyn ChannelAdapter>,
    ledger: Arc<ResourceLedger>,
    decider: Arc<dyn DecisionLoop>,
    backlog: Arc<AtomicUsize>,
}

impl TaskWorker {
    pub(crate) fn new(
        task_id: TaskId,
        channel: Arc<dyn ChannelAdapter>,
        ledger: Arc<ResourceLedger>,
        decider: Arc<dyn DecisionLoop>,
        backlog: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            task_id,
            channel,
            ledger,
            decider,
            backlog,
        }
    }

    /// Run until cancelled or until every sender is gone.
    ///
    /// Cancellation is only observed while waiting for the next message;
    /// a message already being processed runs to completion.
    pub(crate) async fn run(self, mut queue: UnboundedReceiver<String>, cancel: CancellationToken) {
        debug!("Worker for {} started", self.task_id);

        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                message = queue.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            self.process(&message, &cancel).await;
            self.backlog.fetch_sub(1, Ordering::SeqCst);
        }

        debug!("Worker for {} stopped", self.task_id);
    }

    async fn process(&self, message: &str, cancel: &CancellationToken) {
        debug!("Worker for {} processing message ({} chars)", self.task_id, message.len());

        if let Err(e) = self.ledger.ensure(&self.task_id).await {
            error!("Failed to create sandbox for {}: {}", self.task_id, e);
            self.report_error(&format!("Failed to create sandbox: {}", e)).await;
            return;
        }

        if cancel.is_cancelled() {
            // Cleanup ran while the sandbox was being created.
            if let Err(e) = self.ledger.release(&self.task_id).await {
                warn!("Failed to release sandbox of cancelled task {}: {}", self.task_id, e);
            }
            return;
        }

        if let Some(url) = self.channel.checkout_url(&self.task_id) {
            if let Err(e) = self.ledger.resources().checkout(&self.task_id, &url).await {
                error!("Failed to check out repository for {}: {}", self.task_id, e);
                self.report_error(&format!("Failed to check out repository: {}", e))
                    .await;
                return;
            }
        }

        let mut conversation = self.ledger.state().conversation(&self.task_id);
        let updates = Updates::new(self.channel.clone(), self.task_id.clone());

        let outcome = AssertUnwindSafe(self.decider.handle(
            &self.task_id,
            message,
            self.channel.system_prompt(),
            &mut conversation,
            &updates,
        ))
        .catch_unwind()
        .await
        .unwrap_or(Err(DecisionError::Panicked));

        match outcome {
            Ok(result) => {
                if let Err(e) = self.channel.deliver_result(&self.task_id, &result).await {
                    warn!("Failed to deliver result for {}: {}", self.task_id, e);
                }
            }
            Err(e) => {
                warn!("Decision loop failed for {}: {}", self.task_id, e);
                self.report_error(&e.to_string()).await;
            }
        }

        if let Err(e) = self
            .ledger
            .commit_conversation(&self.task_id, conversation)
            .await
        {
            error!("Failed to persist conversation for {}: {}", self.task_id, e);
        }
    }

    async fn report_error(&self, text: &str) {
        if let Err(e) = self.channel.deliver_error(&self.task_id, text).await {
            warn!("Failed to deliver error for {}: {}", self.task_id, e);
        }
    }
}
