use super::*;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn issue_json(number: u64, state: &str, labels: &[&str]) -> Value {
    json!({
        "number": number,
        "title": format!("Issue {number}"),
        "body": "details",
        "state": state,
        "labels": labels.iter().map(|name| json!({"name": name})).collect::<Vec<_>>(),
    })
}

#[test]
fn test_issue_helpers() {
    let issue: Issue = serde_json::from_value(issue_json(1, "open", &["agent-task"])).unwrap();
    assert!(issue.is_open());
    assert!(issue.has_label("agent-task"));
    assert!(!issue.has_label("bug"));
    assert!(!issue.is_pull_request());
}

#[test]
fn test_issue_without_body() {
    let issue: Issue = serde_json::from_value(json!({
        "number": 3,
        "title": "t",
        "body": null,
        "state": "closed",
    }))
    .unwrap();
    assert!(issue.body.is_none());
    assert!(issue.labels.is_empty());
    assert!(!issue.is_open());
}

#[test]
fn test_truncate_comment() {
    assert_eq!(truncate_comment("short"), "short");

    let long = "x".repeat(MAX_COMMENT_CHARS + 10);
    let truncated = truncate_comment(&long);
    assert!(truncated.ends_with("[output truncated]"));
    assert!(truncated.chars().count() < long.chars().count() + 20);
}

#[tokio::test]
async fn test_get_issue_sends_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/issues/7"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(issue_json(7, "open", &["agent-task"])))
        .expect(1)
        .mount(&server)
        .await;

    let api = GitHubApi::new(server.uri(), Some("secret-token".to_string())).unwrap();
    let issue = api.get_issue("o/r", 7).await.unwrap();

    assert_eq!(issue.number, 7);
    assert!(issue.has_label("agent-task"));
}

#[tokio::test]
async fn test_get_issue_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/issues/7"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
        .mount(&server)
        .await;

    let api = GitHubApi::new(server.uri(), None).unwrap();
    let err = api.get_issue("o/r", 7).await.unwrap_err();

    assert!(matches!(err, GitHubError::Status { status: 404, .. }));
}

#[tokio::test]
async fn test_list_open_issues_skips_pull_requests() {
    let server = MockServer::start().await;
    let mut pr = issue_json(2, "open", &["agent-task"]);
    pr["pull_request"] = json!({"url": "https://example.invalid/pr/2"});

    Mock::given(method("GET"))
        .and(path("/repos/o/r/issues"))
        .and(query_param("state", "open"))
        .and(query_param("labels", "agent-task"))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([issue_json(1, "open", &["agent-task"]), pr])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let api = GitHubApi::new(server.uri(), None).unwrap();
    let issues = api.list_open_issues("o/r", "agent-task").await.unwrap();

    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].number, 1);
}

#[tokio::test]
async fn test_list_open_issues_follows_pages() {
    let server = MockServer::start().await;
    let full: Vec<Value> = (1..=PAGE_SIZE as u64)
        .map(|n| issue_json(n, "open", &["agent-task"]))
        .collect();

    Mock::given(method("GET"))
        .and(path("/repos/o/r/issues"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(full)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/issues"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([issue_json(
            500,
            "open",
            &["agent-task"]
        )])))
        .mount(&server)
        .await;

    let api = GitHubApi::new(server.uri(), None).unwrap();
    let issues = api.list_open_issues("o/r", "agent-task").await.unwrap();

    assert_eq!(issues.len(), PAGE_SIZE + 1);
    assert_eq!(issues.last().unwrap().number, 500);
}

#[tokio::test]
async fn test_post_comment() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/o/r/issues/7/comments"))
        .and(body_json(json!({"body": "all done"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let api = GitHubApi::new(format!("{}/", server.uri()), None).unwrap();
    api.post_comment("o/r", 7, "all done").await.unwrap();
}

#[tokio::test]
async fn test_list_comments() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/issues/7/comments"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 10, "body": "first"},
            {"id": 11, "body": null},
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let api = GitHubApi::new(server.uri(), None).unwrap();
    let comments = api.list_comments("o/r", 7).await.unwrap();

    assert_eq!(comments.len(), 2);
    assert_eq!(comments[0].body.as_deref(), Some("first"));
    assert_eq!(comments[1].id, 11);
    assert!(comments[1].body.is_none());
}
