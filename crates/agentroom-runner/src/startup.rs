//! Startup recovery sequencing.
//!
//! The phases are encoded as types so they can only run in order:
//!
//! ```text
//! Startup<Init> --load--> Startup<Loaded> --recover--> Startup<Recovered>
//!     --sweep--> Startup<Swept> --start--> Running
//! ```
//!
//! Channels only receive a [`TaskSink`](agentroom_protocols::TaskSink) in
//! `start`, so no inbound event can reach the registry before every
//! channel has re-claimed its work and orphans have been destroyed.

use std::sync::Arc;
use std::time::Duration;

use agentroom_protocols::{ChannelAdapter, TaskId};
use agentroom_state::{PersistedRecord, StateError};
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::RunnerError;
use crate::reconciler::Reconciler;
use crate::registry::TaskRegistry;
use crate::sink::ChannelSink;

/// What happened during startup.
#[derive(Debug, Clone)]
pub struct StartupReport {
    pub started_at: DateTime<Utc>,
    /// Resources found in the persisted record.
    pub loaded: usize,
    /// Resources dropped because the runtime no longer has them.
    pub stale: usize,
    /// Claims returned by channels.
    pub recovered: usize,
    /// Channels whose connect or recovery failed.
    pub failed_channels: Vec<String>,
    pub orphans_destroyed: usize,
    pub orphans_failed: usize,
}

impl Default for StartupReport {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            loaded: 0,
            stale: 0,
            recovered: 0,
            failed_channels: Vec::new(),
            orphans_destroyed: 0,
            orphans_failed: 0,
        }
    }
}

/// Nothing has run yet.
pub struct Init;

/// The record is loaded; live resources are candidates for the sweep.
pub struct Loaded {
    candidates: Vec<TaskId>,
}

/// Every channel has had its chance to claim work.
pub struct Recovered {
    candidates: Vec<TaskId>,
}

/// Unclaimed resources are gone.
pub struct Swept;

/// Startup sequencer in phase `P`.
pub struct Startup<P> {
    registry: Arc<TaskRegistry>,
    channels: Vec<Arc<dyn ChannelAdapter>>,
    report: StartupReport,
    phase: P,
}

impl<P> Startup<P> {
    pub fn report(&self) -> &StartupReport {
        &self.report
    }

    fn advance<N>(self, phase: N) -> Startup<N> {
        Startup {
            registry: self.registry,
            channels: self.channels,
            report: self.report,
            phase,
        }
    }
}

impl Startup<Init> {
    pub fn new(registry: Arc<TaskRegistry>, channels: Vec<Arc<dyn ChannelAdapter>>) -> Self {
        Self {
            registry,
            channels,
            report: StartupReport::default(),
            phase: Init,
        }
    }

    /// Run every phase and start the channels.
    pub async fn run(self) -> Result<Running, RunnerError> {
        self.load().await?.recover().await.sweep().await.start().await
    }

    /// Read the persisted record and keep only resources that are still
    /// running. An unreadable record is treated as empty; a corrupt file is
    /// moved aside first so it survives for inspection.
    pub async fn load(mut self) -> Result<Startup<Loaded>, RunnerError> {
        let ledger = self.registry.ledger().clone();
        let state = ledger.state();

        let mut record = match state.load().await {
            Ok(record) => record,
            Err(e @ StateError::Corrupt { .. }) => {
                warn!("Ignoring unreadable state file: {}", e);
                match state.quarantine().await {
                    Ok(aside) => warn!("Kept the unreadable state file as {:?}", aside),
                    Err(e) => error!("Failed to move the unreadable state file aside: {}", e),
                }
                PersistedRecord::default()
            }
            Err(e) => {
                warn!("Ignoring unreadable state file: {}", e);
                PersistedRecord::default()
            }
        };
        self.report.loaded = record.containers.len();

        let entries: Vec<(TaskId, String)> = record
            .containers
            .iter()
            .map(|(id, name)| (id.clone(), name.clone()))
            .collect();

        let mut candidates = Vec::new();
        for (task_id, name) in entries {
            match ledger.resources().probe_alive(&task_id).await {
                Ok(true) => candidates.push(task_id),
                Ok(false) => {
                    info!("Dropping stale resource {} for {}", name, task_id);
                    record.remove(&task_id);
                    self.report.stale += 1;
                }
                Err(e) => {
                    warn!("Could not probe {} for {}, keeping it: {}", name, task_id, e);
                    candidates.push(task_id);
                }
            }
        }

        let pruned = record.prune_history();
        if pruned > 0 {
            info!("Dropped {} conversations without a resource", pruned);
        }

        state.install(record);
        state.save().await?;

        info!(
            "Loaded state: {} live, {} stale",
            candidates.len(),
            self.report.stale
        );
        Ok(self.advance(Loaded { candidates }))
    }
}

impl Startup<Loaded> {
    /// Resources that survived the probe.
    pub fn candidates(&self) -> &[TaskId] {
        &self.phase.candidates
    }

    /// Connect each channel and feed its recovered claims to the registry.
    ///
    /// A channel that fails to connect or recover is skipped; its tasks
    /// become orphans.
    pub async fn recover(mut self) -> Startup<Recovered> {
        for channel in &self.channels {
            if let Err(e) = channel.connect().await {
                warn!("Channel {} failed to connect, skipping recovery: {}", channel.id(), e);
                self.report.failed_channels.push(channel.id().to_string());
                continue;
            }

            let claims = match channel.recover_tasks().await {
                Ok(claims) => claims,
                Err(e) => {
                    warn!("Channel {} failed to recover tasks: {}", channel.id(), e);
                    self.report.failed_channels.push(channel.id().to_string());
                    continue;
                }
            };

            info!("Channel {} recovered {} tasks", channel.id(), claims.len());
            for claim in claims {
                match claim.message {
                    Some(message) => self.registry.enqueue(claim.task_id, message, channel.clone()),
                    None => self.registry.pre_register(claim.task_id, channel.clone()),
                }
                self.report.recovered += 1;
            }
        }

        let candidates = std::mem::take(&mut self.phase.candidates);
        self.advance(Recovered { candidates })
    }
}

impl Startup<Recovered> {
    /// Destroy every loaded resource whose task nobody claimed.
    pub async fn sweep(mut self) -> Startup<Swept> {
        let ledger = self.registry.ledger().clone();

        for task_id in std::mem::take(&mut self.phase.candidates) {
            if self.registry.is_processing(&task_id) {
                continue;
            }

            info!("Destroying orphaned resource of {}", task_id);
            match ledger.release(&task_id).await {
                Ok(()) => self.report.orphans_destroyed += 1,
                Err(e) => {
                    error!("Failed to destroy orphan {}: {}", task_id, e);
                    self.report.orphans_failed += 1;
                }
            }
        }

        self.advance(Swept)
    }
}

impl Startup<Swept> {
    /// Hand every channel its sink. A channel that fails to start aborts
    /// startup; channels started before it are stopped again.
    pub async fn start(self) -> Result<Running, RunnerError> {
        let mut started: Vec<Arc<dyn ChannelAdapter>> = Vec::new();

        for channel in &self.channels {
            let sink = Arc::new(ChannelSink::new(self.registry.clone(), channel.clone()));
            if let Err(source) = channel.start(sink).await {
                for running in &started {
                    if let Err(e) = running.stop().await {
                        warn!("Failed to stop channel {}: {}", running.id(), e);
                    }
                }
                return Err(RunnerError::ChannelStart {
                    channel: channel.id().to_string(),
                    source,
                });
            }
            info!("Channel {} started", channel.id());
            started.push(channel.clone());
        }

        info!(
            "Startup complete: {} tasks processing, {} orphans destroyed",
            self.registry.len(),
            self.report.orphans_destroyed
        );

        Ok(Running {
            registry: self.registry,
            channels: self.channels,
            report: self.report,
        })
    }
}

/// Started system.
pub struct Running {
    registry: Arc<TaskRegistry>,
    channels: Vec<Arc<dyn ChannelAdapter>>,
    report: StartupReport,
}

impl Running {
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn report(&self) -> &StartupReport {
        &self.report
    }

    /// Spawn the reconciler. It never runs before startup completes.
    pub fn spawn_reconciler(&self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        Reconciler::new(self.registry.clone(), interval).spawn(shutdown)
    }

    /// Stop every channel, then every worker. Resources are kept.
    pub async fn shutdown(self) {
        for channel in &self.channels {
            if let Err(e) = channel.stop().await {
                warn!("Failed to stop channel {}: {}", channel.id(), e);
            }
        }
        self.registry.shutdown();
    }
}
