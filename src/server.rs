//! Foreground orchestrator.

use std::sync::Arc;

use tracing::{info, warn};

use agentroom_agent_cli::CliAgent;
use agentroom_channel_github::GitHubChannel;
use agentroom_channel_matrix::MatrixChannel;
use agentroom_config::Config;
use agentroom_protocols::ChannelAdapter;
use agentroom_runner::{CancellationToken, ResourceLedger, Startup, TaskRegistry};
use agentroom_sandbox_podman::PodmanSandbox;
use agentroom_state::StateStore;

/// Channels enabled in the configuration.
fn build_channels(
    config: &Config,
    state: &Arc<StateStore>,
) -> Result<Vec<Arc<dyn ChannelAdapter>>, Box<dyn std::error::Error>> {
    let mut channels: Vec<Arc<dyn ChannelAdapter>> = Vec::new();

    if config.matrix.enabled {
        channels.push(Arc::new(MatrixChannel::new(config.matrix.clone(), state.clone())));
        info!("Matrix channel enabled");
    }

    if config.github.enabled {
        channels.push(Arc::new(GitHubChannel::new(config.github.clone())?));
        info!("GitHub channel enabled");
    }

    Ok(channels)
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

/// Run until a shutdown signal arrives.
pub(crate) async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting agentroom v{}", env!("CARGO_PKG_VERSION"));
    info!("State file: {}", config.state.path.display());

    let state = Arc::new(StateStore::new(&config.state.path));
    let sandbox = Arc::new(PodmanSandbox::new(config.sandbox.clone()));
    let agent = Arc::new(CliAgent::new(sandbox.clone(), config.agent.clone()));
    let ledger = Arc::new(ResourceLedger::new(sandbox, state.clone()));
    let registry = Arc::new(TaskRegistry::new(ledger, agent));

    let channels = build_channels(&config, &state)?;
    if channels.is_empty() {
        warn!("No channel enabled; existing sandboxes will be swept and nothing will arrive");
    }

    let running = Startup::new(registry, channels).run().await?;
    let report = running.report();
    info!(
        "Startup report: {} loaded, {} stale, {} recovered, {} orphan(s) destroyed, {} failed",
        report.loaded, report.stale, report.recovered, report.orphans_destroyed, report.orphans_failed
    );
    for channel in &report.failed_channels {
        warn!("Channel {} did not recover its tasks", channel);
    }

    let shutdown = CancellationToken::new();
    let reconciler = running.spawn_reconciler(config.runner.reconcile_interval(), shutdown.clone());

    info!("agentroom running, press Ctrl-C to stop");
    shutdown_signal().await?;
    info!("Shutting down");

    shutdown.cancel();
    if let Err(e) = reconciler.await {
        warn!("Reconciler task failed: {}", e);
    }
    running.shutdown().await;

    info!("agentroom stopped");
    Ok(())
}
