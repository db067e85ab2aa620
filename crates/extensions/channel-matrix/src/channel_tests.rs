use super::*;
use tempfile::TempDir;

struct NullSink;

impl TaskSink for NullSink {
    fn submit(&self, _task_id: TaskId, _message: String) {}

    fn is_processing(&self, _task_id: &TaskId) -> bool {
        false
    }
}

fn config() -> MatrixConfig {
    MatrixConfig {
        enabled: true,
        homeserver: "http://127.0.0.1:1".to_string(),
        user: "@agent:localhost".to_string(),
        password: Some("secret".to_string()),
        ..MatrixConfig::default()
    }
}

fn channel(config: MatrixConfig) -> (TempDir, MatrixChannel) {
    let dir = TempDir::new().unwrap();
    let state = Arc::new(StateStore::new(dir.path().join("state.json")));
    (dir, MatrixChannel::new(config, state))
}

#[test]
fn test_system_prompt_override() {
    let (_dir, default) = channel(config());
    assert_eq!(default.system_prompt(), DEFAULT_SYSTEM_PROMPT);
    assert_eq!(default.id(), "matrix");

    let mut custom = config();
    custom.system_prompt = Some("Be brief.".to_string());
    let (_dir, custom) = channel(custom);
    assert_eq!(custom.system_prompt(), "Be brief.");
}

#[tokio::test]
async fn test_is_valid_before_connect() {
    let (_dir, channel) = channel(config());

    assert!(channel.is_valid(&TaskId::new("matrix:!room:localhost")).await);
    assert!(!channel.is_valid(&TaskId::new("github:o/r#1")).await);
}

#[tokio::test]
async fn test_connect_requires_password() {
    let mut config = config();
    config.password = None;
    let (_dir, channel) = channel(config);

    let err = channel.connect().await.unwrap_err();
    assert!(matches!(err, ChannelError::AuthenticationFailed(_)));
    assert!(!channel.is_connected());
}

#[tokio::test]
async fn test_operations_need_a_connection() {
    let (_dir, channel) = channel(config());
    let room = TaskId::new("matrix:!room:localhost");

    assert!(matches!(
        channel.recover_tasks().await,
        Err(ChannelError::NotStarted(_))
    ));
    assert!(matches!(
        channel.deliver_result(&room, "done").await,
        Err(ChannelError::NotStarted(_))
    ));
    assert!(matches!(
        channel.start(Arc::new(NullSink)).await,
        Err(ChannelError::NotStarted(_))
    ));
    assert!(!channel.is_started());
}

#[tokio::test]
async fn test_deliver_to_foreign_task_fails() {
    let (_dir, channel) = channel(config());
    let err = channel
        .deliver_error(&TaskId::new("github:o/r#1"), "boom")
        .await
        .unwrap_err();
    assert!(matches!(err, ChannelError::SendFailed(_)));
}

#[tokio::test]
async fn test_stop_without_start_is_harmless() {
    let (_dir, channel) = channel(config());
    channel.stop().await.unwrap();
}
