//! CLI definitions for agentroom.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// agentroom CLI.
#[derive(Parser)]
#[command(name = "agentroom")]
#[command(about = "Sandboxed coding-agent task orchestrator")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "agentroom.toml", global = true, env = "AGENTROOM_CONFIG")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the orchestrator in foreground (default)
    Run,

    /// Show the persisted task record
    State {
        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },
}
