//! GitHub issue channel.

use std::net::SocketAddr;
use std::sync::Arc;

use agentroom_config::GitHubConfig;
use agentroom_protocols::{ChannelAdapter, ChannelError, RecoveredClaim, TaskId, TaskSink};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::api::{Comment, GitHubApi, Issue};
use crate::error::GitHubError;
use crate::webhook::{WebhookState, create_router, issue_message};
use crate::{SCHEME, issue_task_id, parse_issue_task_id};

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;

const DEFAULT_SYSTEM_PROMPT: &str = "You are an autonomous software engineer working on a GitHub \
issue. The repository is cloned at /workspace/repo; work there. Make the change the issue asks \
for, run the relevant tests, and finish with a short summary of what you changed. Your final \
answer is posted as a comment on the issue.";

/// Hidden first line of every comment the agent posts. An issue whose
/// latest comment carries it has already been answered.
const COMMENT_MARKER: &str = "<!-- agentroom -->";

const RESUME_NOTE: &str = "The service restarted while this issue was in progress. \
Check the current state of the workspace and continue.";

struct Server {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
    addr: SocketAddr,
}

pub struct GitHubChannel {
    config: GitHubConfig,
    repo: String,
    api: GitHubApi,
    system_prompt: String,
    server: Mutex<Option<Server>>,
}

impl GitHubChannel {
    pub fn new(config: GitHubConfig) -> Result<Self, GitHubError> {
        let repo = config
            .repo
            .clone()
            .ok_or(GitHubError::MissingConfig("github.repo"))?;
        let api = GitHubApi::new(config.api_base.clone(), config.token.clone())?;
        let system_prompt = config
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        Ok(Self {
            config,
            repo,
            api,
            system_prompt,
            server: Mutex::new(None),
        })
    }

    /// Address the webhook listener is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.lock().as_ref().map(|server| server.addr)
    }

    pub fn is_started(&self) -> bool {
        self.server.lock().is_some()
    }

    fn issue_of<'a>(&self, task_id: &'a TaskId) -> Result<(&'a str, u64), GitHubError> {
        parse_issue_task_id(task_id).ok_or_else(|| GitHubError::NotAnIssue(task_id.to_string()))
    }

    async fn post(&self, task_id: &TaskId, text: &str) -> Result<(), GitHubError> {
        let (repo, number) = self.issue_of(task_id)?;
        let body = format!("{}\n{}", COMMENT_MARKER, text);
        self.api.post_comment(repo, number, &body).await
    }

    /// Whether the agent already answered `issue`. An issue whose comments
    /// cannot be read counts as answered, so it is kept but not rerun.
    async fn is_answered(&self, issue: &Issue) -> bool {
        if issue.comments == 0 {
            return false;
        }
        match self.api.list_comments(&self.repo, issue.number).await {
            Ok(comments) => comments.last().is_some_and(is_agent_comment),
            Err(e) => {
                warn!("Could not read comments of #{}, not resuming it: {}", issue.number, e);
                true
            }
        }
    }
}

fn is_agent_comment(comment: &Comment) -> bool {
    comment
        .body
        .as_deref()
        .is_some_and(|body| body.starts_with(COMMENT_MARKER))
}

/// HTTPS clone URL, authenticated when a token is set.
fn clone_url(git_base: &str, repo: &str, token: Option<&str>) -> String {
    let base = git_base.trim_end_matches('/');
    match (token, base.split_once("://")) {
        (Some(token), Some((scheme, host))) => {
            format!("{}://x-access-token:{}@{}/{}.git", scheme, token, host, repo)
        }
        _ => format!("{}/{}.git", base, repo),
    }
}

#[async_trait]
impl ChannelAdapter for GitHubChannel {
    fn id(&self) -> &str {
        SCHEME
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Issues only receive the final comment.
    async fn send_update(&self, _task_id: &TaskId, _text: &str) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn deliver_result(&self, task_id: &TaskId, text: &str) -> Result<(), ChannelError> {
        self.post(task_id, text).await?;
        info!("Posted result to {}", task_id);
        Ok(())
    }

    async fn deliver_error(&self, task_id: &TaskId, error: &str) -> Result<(), ChannelError> {
        let body = format!("The agent hit an error:\n\n```\n{}\n```", error);
        self.post(task_id, &body).await?;
        Ok(())
    }

    /// Open and still labeled. An unreachable API keeps the task.
    async fn is_valid(&self, task_id: &TaskId) -> bool {
        let Some((repo, number)) = parse_issue_task_id(task_id) else {
            return false;
        };
        match self.api.get_issue(repo, number).await {
            Ok(issue) => issue.is_open() && issue.has_label(&self.config.label),
            Err(e) => {
                warn!("Could not check {}: {}", task_id, e);
                true
            }
        }
    }

    async fn recover_tasks(&self) -> Result<Vec<RecoveredClaim>, ChannelError> {
        let issues = self
            .api
            .list_open_issues(&self.repo, &self.config.label)
            .await
            .map_err(|e| ChannelError::RecoveryFailed(e.to_string()))?;

        let mut claims = Vec::with_capacity(issues.len());
        let mut resumed = 0;
        for issue in &issues {
            let task_id = issue_task_id(&self.repo, issue.number);
            if self.is_answered(issue).await {
                claims.push(RecoveredClaim::keep(task_id));
            } else {
                let message = format!("{}\n\n{}", RESUME_NOTE, issue_message(&self.repo, issue));
                claims.push(RecoveredClaim::resume(task_id, message));
                resumed += 1;
            }
        }

        info!(
            "Recovered {} open issue(s) in {}, {} to resume",
            claims.len(),
            self.repo,
            resumed
        );
        Ok(claims)
    }

    fn checkout_url(&self, task_id: &TaskId) -> Option<String> {
        let (repo, _) = parse_issue_task_id(task_id)?;
        Some(clone_url(&self.config.git_base, repo, self.config.token.as_deref()))
    }

    async fn start(&self, sink: Arc<dyn TaskSink>) -> Result<(), ChannelError> {
        if self.is_started() {
            return Err(ChannelError::AlreadyStarted(SCHEME.to_string()));
        }

        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;

        let router = create_router(Arc::new(WebhookState {
            channel_id: SCHEME.to_string(),
            repo: self.repo.clone(),
            secret: self.config.webhook_secret.clone(),
            label: self.config.label.clone(),
            sink,
        }));

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { signal.cancelled().await });
            if let Err(e) = serve.await {
                error!("GitHub webhook server error: {}", e);
            }
        });

        info!("GitHub webhook listening on {}", addr);
        *self.server.lock() = Some(Server {
            shutdown,
            handle,
            addr,
        });
        Ok(())
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        let server = self.server.lock().take();
        let Some(server) = server else {
            return Ok(());
        };

        server.shutdown.cancel();
        if let Err(e) = server.handle.await {
            warn!("GitHub webhook server task failed: {}", e);
        }
        info!("GitHub webhook stopped");
        Ok(())
    }
}
