//! Decision loop that hands each message to a coding-agent CLI running
//! inside the task's sandbox.

mod agent;
mod stream;

pub use agent::{CliAgent, SandboxExec};
pub use stream::{ChunkBuffer, strip_ansi};
