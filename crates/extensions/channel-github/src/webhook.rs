//! Webhook endpoint.

use std::sync::Arc;

use agentroom_protocols::{TaskId, TaskSink};
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use tracing::{debug, info, warn};

use crate::api::Issue;
use crate::issue_task_id;

#[cfg(test)]
#[path = "webhook_tests.rs"]
mod tests;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "x-hub-signature-256";
const EVENT_HEADER: &str = "x-github-event";

/// Shared state of the webhook routes.
pub struct WebhookState {
    pub channel_id: String,
    /// Only deliveries for this `owner/name` are accepted.
    pub repo: String,
    pub secret: Option<String>,
    pub label: String,
    pub sink: Arc<dyn TaskSink>,
}

pub fn create_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/webhook/github", post(handle_webhook))
        .route("/health", get(health_check))
        .with_state(state)
}

/// Constant-time check of an `X-Hub-Signature-256` value.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Some(digest) = signature.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[derive(Debug, Deserialize)]
struct Repository {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct IssuesEvent {
    issue: Issue,
    repository: Repository,
}

/// Task submission derived from a webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueTask {
    pub task_id: TaskId,
    pub message: String,
}

/// Text handed to the agent for an issue.
pub fn issue_message(repo: &str, issue: &Issue) -> String {
    format!(
        "Repository: {}\nIssue #{}\n\n{}\n\n{}",
        repo,
        issue.number,
        issue.title,
        issue.body.as_deref().unwrap_or_default()
    )
}

/// Extract the task from an `issues` delivery. `Ok(None)` for anything
/// other than `label` being added to an issue of `repo`.
pub fn parse_issue_event(
    payload: &Value,
    label: &str,
    repo: &str,
) -> Result<Option<IssueTask>, serde_json::Error> {
    if payload.get("action").and_then(Value::as_str) != Some("labeled") {
        return Ok(None);
    }
    let added = payload
        .get("label")
        .and_then(|l| l.get("name"))
        .and_then(Value::as_str);
    if added != Some(label) {
        return Ok(None);
    }

    let event = IssuesEvent::deserialize(payload)?;
    if !event.repository.full_name.eq_ignore_ascii_case(repo) {
        debug!("Ignoring issue from {}", event.repository.full_name);
        return Ok(None);
    }
    Ok(Some(IssueTask {
        task_id: issue_task_id(repo, event.issue.number),
        message: issue_message(repo, &event.issue),
    }))
}

async fn handle_webhook(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if let Some(secret) = &state.secret {
        let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
            warn!("Webhook delivery without signature");
            return (StatusCode::UNAUTHORIZED, "Missing signature");
        };
        if !verify_signature(secret, &body, signature) {
            warn!("Webhook delivery with invalid signature");
            return (StatusCode::UNAUTHORIZED, "Invalid signature");
        }
    }

    let event = headers.get(EVENT_HEADER).and_then(|v| v.to_str().ok());
    if event.is_some_and(|e| e != "issues") {
        debug!("Ignoring {:?} event", event);
        return (StatusCode::OK, "Ignored");
    }

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Malformed webhook payload: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid payload");
        }
    };

    let task = match parse_issue_event(&payload, &state.label, &state.repo) {
        Ok(Some(task)) => task,
        Ok(None) => return (StatusCode::OK, "Ignored"),
        Err(e) => {
            warn!("Unexpected issues payload: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid payload");
        }
    };

    if state.sink.is_processing(&task.task_id) {
        info!("{} is already processing, ignoring duplicate delivery", task.task_id);
        return (StatusCode::OK, "Already processing");
    }

    info!("Accepted {} from webhook", task.task_id);
    state.sink.submit(task.task_id, task.message);
    (StatusCode::ACCEPTED, "Accepted")
}

async fn health_check(State(state): State<Arc<WebhookState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "channel_id": state.channel_id,
    }))
}
