//! # Agentroom Runner
//!
//! Task lifecycle orchestration.
//!
//! ## Features
//!
//! - One ordered queue and one worker per task id, tasks run in parallel
//! - Sandbox creation on first use, persisted after every change
//! - Periodic reconciliation against each channel's view of validity
//! - Startup recovery: load, let channels re-claim work, sweep orphans, start

pub mod error;
pub mod ledger;
pub mod reconciler;
pub mod registry;
pub mod sink;
pub mod startup;
mod worker;

pub use error::RunnerError;
pub use ledger::ResourceLedger;
pub use reconciler::{ReconcileReport, Reconciler};
pub use registry::TaskRegistry;
pub use sink::ChannelSink;
pub use startup::{Running, Startup, StartupReport};
pub use tokio_util::sync::CancellationToken;
