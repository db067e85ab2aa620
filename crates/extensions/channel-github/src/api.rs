//! Minimal GitHub REST client.

use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::GitHubError;

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("agentroom/", env!("CARGO_PKG_VERSION"));
const PAGE_SIZE: usize = 100;

/// GitHub rejects comments longer than 65536 characters.
const MAX_COMMENT_CHARS: usize = 65_000;

#[derive(Debug, Clone, Deserialize)]
pub struct Label {
    pub name: String,
}

/// The fields of an issue the channel cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: String,
    #[serde(default)]
    pub labels: Vec<Label>,
    /// Present when the "issue" is actually a pull request.
    #[serde(default)]
    pub pull_request: Option<Value>,
    /// Number of comments.
    #[serde(default)]
    pub comments: u64,
}

impl Issue {
    pub fn is_open(&self) -> bool {
        self.state == "open"
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l.name == label)
    }

    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Comment {
    pub id: u64,
    #[serde(default)]
    pub body: Option<String>,
}

pub struct GitHubApi {
    client: Client,
    base: String,
    token: Option<String>,
}

impl GitHubApi {
    pub fn new(base: impl Into<String>, token: Option<String>) -> Result<Self, GitHubError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        let base = base.into().trim_end_matches('/').to_string();
        Ok(Self {
            client,
            base,
            token,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base, path);
        debug!("GitHub {} {}", method, url);
        let request = self
            .client
            .request(method, url)
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(response: Response) -> Result<Response, GitHubError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(GitHubError::Status {
            status: status.as_u16(),
            body,
        })
    }

    pub async fn get_issue(&self, repo: &str, number: u64) -> Result<Issue, GitHubError> {
        let response = self
            .request(Method::GET, &format!("/repos/{}/issues/{}", repo, number))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Every item of a paginated listing. Follows pages until a short one
    /// comes back.
    async fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, GitHubError> {
        let mut items = Vec::new();
        let per_page = PAGE_SIZE.to_string();

        for page in 1.. {
            let page = page.to_string();
            let response = self
                .request(Method::GET, path)
                .query(query)
                .query(&[("per_page", per_page.as_str()), ("page", page.as_str())])
                .send()
                .await?;
            let batch: Vec<T> = Self::check(response).await?.json().await?;
            let last = batch.len() < PAGE_SIZE;
            items.extend(batch);
            if last {
                break;
            }
        }

        Ok(items)
    }

    /// Open issues carrying `label`, pull requests excluded.
    pub async fn list_open_issues(&self, repo: &str, label: &str) -> Result<Vec<Issue>, GitHubError> {
        let issues: Vec<Issue> = self
            .get_all(
                &format!("/repos/{}/issues", repo),
                &[("state", "open"), ("labels", label)],
            )
            .await?;
        Ok(issues.into_iter().filter(|issue| !issue.is_pull_request()).collect())
    }

    /// Comments of an issue, oldest first.
    pub async fn list_comments(&self, repo: &str, number: u64) -> Result<Vec<Comment>, GitHubError> {
        self.get_all(&format!("/repos/{}/issues/{}/comments", repo, number), &[])
            .await
    }

    pub async fn post_comment(&self, repo: &str, number: u64, body: &str) -> Result<(), GitHubError> {
        let body = truncate_comment(body);
        let response = self
            .request(Method::POST, &format!("/repos/{}/issues/{}/comments", repo, number))
            .json(&json!({ "body": body }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

fn truncate_comment(body: &str) -> String {
    if body.chars().count() <= MAX_COMMENT_CHARS {
        return body.to_string();
    }
    let mut truncated: String = body.chars().take(MAX_COMMENT_CHARS).collect();
    truncated.push_str("\n\n[output truncated]");
    truncated
}
