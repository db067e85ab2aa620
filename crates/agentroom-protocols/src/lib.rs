//! # Agentroom Protocols
//!
//! Interface definitions shared by the orchestrator core and its
//! collaborators. Contains only traits and small value types.
//!
//! ## Core Traits
//!
//! - [`ChannelAdapter`] - Boundary between the core and a transport (Matrix, GitHub, ...)
//! - [`TaskSink`] - Handle a started channel uses to feed work into the registry
//! - [`ResourceManager`] - Create, destroy and probe per-task sandboxes
//! - [`DecisionLoop`] - Black-box worker invoked once per queued message

pub mod channel;
pub mod decision;
pub mod error;
pub mod resource;
pub mod task;

pub use channel::{ChannelAdapter, TaskSink};
pub use decision::{DecisionLoop, Updates};
pub use error::{ChannelError, DecisionError, ResourceError};
pub use resource::{resource_name, ResourceManager};
pub use task::{Conversation, RecoveredClaim, TaskId};
