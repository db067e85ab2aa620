//! Podman command wrapper.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use agentroom_config::SandboxConfig;
use agentroom_protocols::{ResourceError, ResourceManager, TaskId, resource_name};
use async_trait::async_trait;
use tokio::fs;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

#[cfg(test)]
#[path = "podman_tests.rs"]
mod tests;

/// Mount point of the IPC directory inside the sandbox.
const IPC_MOUNT: &str = "/workspace/.ipc";

/// Grace period given to `podman stop`.
const STOP_TIMEOUT: Duration = Duration::from_secs(15);

/// Where a task's repository is cloned inside the sandbox.
pub const REPO_DIR: &str = "/workspace/repo";

/// Clones can take far longer than the other runtime commands.
const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(600);

/// Clone `$1` into `$2` unless a clone is already there.
const CHECKOUT_SCRIPT: &str = r#"test -d "$2/.git" || git clone --quiet "$1" "$2""#;

/// Captured output of one podman invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code, `-1` when killed by a signal.
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// One container per task, managed through the podman CLI.
pub struct PodmanSandbox {
    config: SandboxConfig,
}

impl PodmanSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Host IPC directory of the sandbox `name`.
    pub fn ipc_dir(&self, name: &str) -> PathBuf {
        self.config.ipc_base_dir.join(name)
    }

    fn run_args(&self, name: &str, ipc_dir: &Path) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            name.to_string(),
            format!("--shm-size={}", self.config.shm_size),
            "-v".to_string(),
            format!("{}:{}:Z", ipc_dir.display(), IPC_MOUNT),
        ];
        for (key, value) in &self.config.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(self.config.image.clone());
        args.push("sleep".to_string());
        args.push("infinity".to_string());
        args
    }

    fn checkout_args(name: &str, url: &str) -> Vec<String> {
        vec![
            "exec".to_string(),
            name.to_string(),
            "sh".to_string(),
            "-c".to_string(),
            CHECKOUT_SCRIPT.to_string(),
            "sh".to_string(),
            url.to_string(),
            REPO_DIR.to_string(),
        ]
    }

    /// Command running `argv` inside the task's sandbox. Not yet spawned;
    /// stdout and stderr are piped and the child is killed when dropped.
    pub fn exec_command(&self, task_id: &TaskId, workdir: &str, argv: &[String]) -> Command {
        let mut cmd = Command::new(&self.config.podman_path);
        cmd.arg("exec")
            .arg("--workdir")
            .arg(workdir)
            .arg(resource_name(task_id))
            .args(argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn podman(&self, args: &[String], limit: Duration) -> Result<CommandOutput, ResourceError> {
        debug!("{} {}", self.config.podman_path, redact_credentials(&args.join(" ")));

        let mut cmd = Command::new(&self.config.podman_path);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = timeout(limit, cmd.output())
            .await
            .map_err(|_| ResourceError::Timeout(limit.as_secs()))??;

        Ok(CommandOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

fn is_running(status: &str) -> bool {
    status.trim() == "running"
}

fn is_missing(stderr: &str) -> bool {
    stderr.to_lowercase().contains("no such container")
}

/// Replace the user-info part of every URL in `text` with `***`.
fn redact_credentials(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("://") {
        let (head, tail) = rest.split_at(start + 3);
        out.push_str(head);
        let authority_end = tail
            .find(|c: char| c == '/' || c == '\'' || c == '"' || c.is_whitespace())
            .unwrap_or(tail.len());
        match tail[..authority_end].rfind('@') {
            Some(at) => {
                out.push_str("***");
                rest = &tail[at..];
            }
            None => rest = tail,
        }
    }
    out.push_str(rest);
    out
}

#[async_trait]
impl ResourceManager for PodmanSandbox {
    async fn create(&self, task_id: &TaskId) -> Result<String, ResourceError> {
        let name = resource_name(task_id);
        let ipc_dir = self.ipc_dir(&name);
        fs::create_dir_all(&ipc_dir).await?;

        // A container left behind by a run that crashed before saving
        // would block the name.
        let leftover = vec!["rm".to_string(), "-f".to_string(), name.clone()];
        if let Err(e) = self.podman(&leftover, self.config.command_timeout()).await {
            debug!("Pre-create cleanup of {} failed: {}", name, e);
        }

        let output = self
            .podman(&self.run_args(&name, &ipc_dir), self.config.command_timeout())
            .await?;
        if !output.success() {
            return Err(ResourceError::CreateFailed {
                name,
                message: output.stderr.trim().to_string(),
            });
        }

        info!("Created sandbox {} for {}", name, task_id);
        Ok(name)
    }

    async fn destroy(&self, task_id: &TaskId) -> Result<(), ResourceError> {
        let name = resource_name(task_id);

        let stop = vec!["stop".to_string(), name.clone()];
        match self.podman(&stop, STOP_TIMEOUT).await {
            Ok(output) if !output.success() && !is_missing(&output.stderr) => {
                warn!("podman stop {} failed: {}", name, output.stderr.trim());
            }
            Err(e) => warn!("podman stop {} failed: {}", name, e),
            Ok(_) => {}
        }

        let rm = vec!["rm".to_string(), "-f".to_string(), name.clone()];
        let output = self.podman(&rm, self.config.command_timeout()).await?;
        if !output.success() && !is_missing(&output.stderr) {
            return Err(ResourceError::DestroyFailed {
                name,
                message: output.stderr.trim().to_string(),
            });
        }

        match fs::remove_dir_all(self.ipc_dir(&name)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove IPC dir of {}: {}", name, e),
        }

        info!("Destroyed sandbox {} for {}", name, task_id);
        Ok(())
    }

    async fn probe_alive(&self, task_id: &TaskId) -> Result<bool, ResourceError> {
        let name = resource_name(task_id);
        let args = vec![
            "inspect".to_string(),
            "--format".to_string(),
            "{{.State.Status}}".to_string(),
            name,
        ];
        let output = self.podman(&args, self.config.command_timeout()).await?;
        Ok(output.success() && is_running(&output.stdout))
    }

    async fn checkout(&self, task_id: &TaskId, url: &str) -> Result<(), ResourceError> {
        let name = resource_name(task_id);
        let output = self
            .podman(&Self::checkout_args(&name, url), CHECKOUT_TIMEOUT)
            .await?;
        if !output.success() {
            return Err(ResourceError::CheckoutFailed {
                name,
                message: redact_credentials(output.stderr.trim()),
            });
        }

        debug!("Repository ready at {} in {}", REPO_DIR, name);
        Ok(())
    }
}
