//! Podman-backed sandboxes.
//!
//! Every task gets one long-running container named after its task id,
//! with a host directory mounted at `/workspace/.ipc`. Repositories are
//! cloned to `/workspace/repo` on demand.

mod podman;

pub use podman::{CommandOutput, PodmanSandbox, REPO_DIR};
