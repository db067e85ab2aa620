//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub state: StateConfig,

    #[serde(default)]
    pub runner: RunnerConfig,

    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub matrix: MatrixConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Persisted record location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Path of the JSON state file.
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

fn default_state_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".agentroom")
        .join("state.json")
}

/// Task runner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Seconds between two reconciler sweeps.
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,
}

impl RunnerConfig {
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: default_reconcile_interval(),
        }
    }
}

fn default_reconcile_interval() -> u64 {
    60
}

/// Podman sandbox settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Podman executable.
    #[serde(default = "default_podman_path")]
    pub podman_path: String,

    /// Image every sandbox is started from.
    #[serde(default = "default_image")]
    pub image: String,

    /// Upper bound for a single podman command, in seconds.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Host directory holding one IPC directory per sandbox.
    #[serde(default = "default_ipc_base_dir")]
    pub ipc_base_dir: PathBuf,

    /// Shared memory size passed to `podman run`.
    #[serde(default = "default_shm_size")]
    pub shm_size: String,

    /// Extra environment variables set inside every sandbox.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl SandboxConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            podman_path: default_podman_path(),
            image: default_image(),
            command_timeout_secs: default_command_timeout(),
            ipc_base_dir: default_ipc_base_dir(),
            shm_size: default_shm_size(),
            env: BTreeMap::new(),
        }
    }
}

fn default_podman_path() -> String {
    "podman".to_string()
}

fn default_image() -> String {
    "agentroom-sandbox:latest".to_string()
}

fn default_command_timeout() -> u64 {
    120
}

fn default_ipc_base_dir() -> PathBuf {
    PathBuf::from("/tmp/sandbox-ipc")
}

fn default_shm_size() -> String {
    "256m".to_string()
}

/// Coding agent CLI run inside the sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Program executed in the sandbox.
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments placed before the prompt.
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Working directory inside the sandbox.
    #[serde(default = "default_workdir")]
    pub workdir: String,

    /// Upper bound for one agent run, in seconds.
    #[serde(default = "default_agent_timeout")]
    pub timeout_secs: u64,

    /// Characters of output collected before an update is sent.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl AgentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            workdir: default_workdir(),
            timeout_secs: default_agent_timeout(),
            chunk_size: default_chunk_size(),
        }
    }
}

fn default_program() -> String {
    "gemini".to_string()
}

fn default_args() -> Vec<String> {
    vec!["--yolo".to_string(), "-p".to_string()]
}

fn default_workdir() -> String {
    "/workspace".to_string()
}

fn default_agent_timeout() -> u64 {
    1800
}

fn default_chunk_size() -> usize {
    800
}

/// GitHub issue channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Webhook listener host.
    #[serde(default = "default_github_host")]
    pub host: String,

    /// Webhook listener port.
    #[serde(default = "default_github_port")]
    pub port: u16,

    /// Shared secret used to sign webhook payloads.
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// API token used for comments and issue lookups.
    #[serde(default)]
    pub token: Option<String>,

    /// Repository in `owner/name` form.
    #[serde(default)]
    pub repo: Option<String>,

    /// Label that turns an issue into a task.
    #[serde(default = "default_label")]
    pub label: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Host the repository is cloned from.
    #[serde(default = "default_git_base")]
    pub git_base: String,

    /// Overrides the built-in system prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_github_host(),
            port: default_github_port(),
            webhook_secret: None,
            token: None,
            repo: None,
            label: default_label(),
            api_base: default_api_base(),
            git_base: default_git_base(),
            system_prompt: None,
        }
    }
}

fn default_github_host() -> String {
    "0.0.0.0".to_string()
}

fn default_github_port() -> u16 {
    8090
}

fn default_label() -> String {
    "agent-task".to_string()
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_git_base() -> String {
    "https://github.com".to_string()
}

/// Matrix room channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_homeserver")]
    pub homeserver: String,

    /// Full user id of the bot, e.g. `@agent:example.org`.
    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub password: Option<String>,

    /// Display name of the device created at login.
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// Long-poll timeout of each sync request.
    #[serde(default = "default_sync_timeout")]
    pub sync_timeout_secs: u64,

    /// Overrides the built-in system prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl MatrixConfig {
    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_secs)
    }
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            homeserver: default_homeserver(),
            user: String::new(),
            password: None,
            device_name: default_device_name(),
            sync_timeout_secs: default_sync_timeout(),
            system_prompt: None,
        }
    }
}

fn default_homeserver() -> String {
    "https://matrix.org".to_string()
}

fn default_device_name() -> String {
    "agentroom".to_string()
}

fn default_sync_timeout() -> u64 {
    30
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_level")]
    pub level: String,

    /// Directory for daily rotated log files. Console only when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            dir: None,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
