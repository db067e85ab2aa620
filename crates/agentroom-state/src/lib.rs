//! # Agentroom State
//!
//! Durable shadow of the task registry.
//!
//! ## Features
//!
//! - Resource name and conversation state per task
//! - Whole-file atomic replace (temp file + rename) on every save
//! - Pure load; callers decide what to keep

pub mod error;
pub mod record;
pub mod store;

pub use error::StateError;
pub use record::PersistedRecord;
pub use store::StateStore;
