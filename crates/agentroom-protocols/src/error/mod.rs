//! Error types for the protocol layer.

mod channel;
mod decision;
mod resource;

pub use channel::*;
pub use decision::*;
pub use resource::*;
