//! Coding-agent CLI decision loop.

use std::process::ExitStatus;
use std::sync::Arc;

use agentroom_config::AgentConfig;
use agentroom_protocols::{Conversation, DecisionError, DecisionLoop, TaskId, Updates};
use agentroom_sandbox_podman::PodmanSandbox;
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::stream::{ChunkBuffer, strip_ansi};

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;

/// Conversation entries replayed into each prompt.
const HISTORY_ENTRIES: usize = 6;

/// Longest replayed entry, in characters.
const HISTORY_ENTRY_CHARS: usize = 2000;

/// Builds the command that runs `argv` inside a task's sandbox.
pub trait SandboxExec: Send + Sync {
    fn command(&self, task_id: &TaskId, workdir: &str, argv: &[String]) -> Command;
}

impl SandboxExec for PodmanSandbox {
    fn command(&self, task_id: &TaskId, workdir: &str, argv: &[String]) -> Command {
        self.exec_command(task_id, workdir, argv)
    }
}

/// Runs the configured CLI once per message and relays its stdout.
pub struct CliAgent {
    exec: Arc<dyn SandboxExec>,
    config: AgentConfig,
}

impl CliAgent {
    pub fn new(exec: Arc<dyn SandboxExec>, config: AgentConfig) -> Self {
        Self { exec, config }
    }

    fn argv(&self, prompt: String) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.config.args.len() + 2);
        argv.push(self.config.program.clone());
        argv.extend(self.config.args.iter().cloned());
        argv.push(prompt);
        argv
    }

    /// Relay stdout line by line. Bytes that are not UTF-8 are replaced.
    async fn read_stdout<R>(
        &self,
        stdout: R,
        chunks: &mut ChunkBuffer,
        updates: &Updates,
    ) -> std::io::Result<String>
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(stdout);
        let mut raw = Vec::new();
        let mut collected = String::new();

        loop {
            raw.clear();
            if reader.read_until(b'\n', &mut raw).await? == 0 {
                break;
            }
            let decoded = String::from_utf8_lossy(&raw);
            let line = strip_ansi(decoded.trim_end_matches(['\n', '\r']));
            collected.push_str(&line);
            collected.push('\n');
            if let Some(chunk) = chunks.push(&line) {
                updates.send(&chunk).await;
            }
        }
        if let Some(chunk) = chunks.flush() {
            updates.send(&chunk).await;
        }

        Ok(collected)
    }
}

async fn read_all<R>(reader: R) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut bytes = Vec::new();
    BufReader::new(reader).read_to_end(&mut bytes).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Prompt for one run: system prompt, recent history, then the message.
fn build_prompt(system_prompt: &str, conversation: &Conversation, message: &str) -> String {
    let mut prompt = String::new();
    if !system_prompt.trim().is_empty() {
        prompt.push_str(system_prompt.trim());
        prompt.push_str("\n\n");
    }

    let start = conversation.len().saturating_sub(HISTORY_ENTRIES);
    let history: Vec<String> = conversation[start..]
        .iter()
        .filter_map(history_line)
        .collect();
    if !history.is_empty() {
        prompt.push_str("Previous exchanges:\n");
        for line in history {
            prompt.push_str(&line);
            prompt.push('\n');
        }
        prompt.push('\n');
    }

    prompt.push_str(message);
    prompt
}

fn history_line(entry: &Value) -> Option<String> {
    let role = entry.get("role")?.as_str()?;
    let content = entry.get("content")?.as_str()?;
    let content: String = content.chars().take(HISTORY_ENTRY_CHARS).collect();
    Some(format!("{}: {}", role, content))
}

fn failure_message(status: ExitStatus, stdout: &str, stderr: &str) -> String {
    let detail = if stderr.trim().is_empty() {
        stdout.trim()
    } else {
        stderr.trim()
    };
    match status.code() {
        Some(code) => format!("exit code {}: {}", code, detail),
        None => format!("terminated by signal: {}", detail),
    }
}

#[async_trait]
impl DecisionLoop for CliAgent {
    async fn handle(
        &self,
        task_id: &TaskId,
        message: &str,
        system_prompt: &str,
        conversation: &mut Conversation,
        updates: &Updates,
    ) -> Result<String, DecisionError> {
        let prompt = build_prompt(system_prompt, conversation, message);
        conversation.push(json!({"role": "user", "content": message}));

        let mut child = self
            .exec
            .command(task_id, &self.config.workdir, &self.argv(prompt))
            .spawn()?;
        info!("{} started for {}", self.config.program, task_id);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DecisionError::ExecutionFailed("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DecisionError::ExecutionFailed("stderr not captured".to_string()))?;

        let mut chunks = ChunkBuffer::new(self.config.chunk_size);
        let run = async {
            let (stdout, stderr) = tokio::join!(
                self.read_stdout(stdout, &mut chunks, updates),
                read_all(stderr)
            );
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, stdout?, stderr?))
        };

        let outcome = timeout(self.config.timeout(), run).await;
        let (status, stdout, stderr) = match outcome {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    "{} timed out for {} after {}s",
                    self.config.program, task_id, self.config.timeout_secs
                );
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill {} for {}: {}", self.config.program, task_id, e);
                }
                if let Some(chunk) = chunks.flush() {
                    updates.send(&chunk).await;
                }
                return Err(DecisionError::Timeout(self.config.timeout_secs));
            }
        };

        info!(
            "{} finished for {} (exit={:?}, stdout={} chars)",
            self.config.program,
            task_id,
            status.code(),
            stdout.len()
        );

        if !status.success() {
            return Err(DecisionError::ExecutionFailed(failure_message(
                status, &stdout, &stderr,
            )));
        }

        let result = match stdout.trim() {
            "" => "(no output)".to_string(),
            text => text.to_string(),
        };
        conversation.push(json!({"role": "assistant", "content": result.as_str()}));
        Ok(result)
    }
}
