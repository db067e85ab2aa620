use super::*;

#[test]
fn test_default_config_is_valid() {
    let result = ConfigValidator::validate(&Config::default());
    assert!(result.is_valid());
    assert!(result.warnings.is_empty());
}

#[test]
fn test_zero_interval_is_rejected() {
    let mut config = Config::default();
    config.runner.reconcile_interval_secs = 0;

    let result = ConfigValidator::validate(&config);
    assert!(!result.is_valid());
    assert_eq!(result.errors[0].path, "runner.reconcile_interval_secs");
}

#[test]
fn test_zero_chunk_size_is_rejected() {
    let mut config = Config::default();
    config.agent.chunk_size = 0;

    let result = ConfigValidator::validate(&config);
    assert!(result.errors.iter().any(|e| e.path == "agent.chunk_size"));
}

#[test]
fn test_github_requires_repo() {
    let mut config = Config::default();
    config.github.enabled = true;

    let result = ConfigValidator::validate(&config);
    assert!(result.errors.iter().any(|e| e.path == "github.repo"));
}

#[test]
fn test_github_repo_format() {
    let mut config = Config::default();
    config.github.enabled = true;
    config.github.repo = Some("just-a-name".to_string());

    let result = ConfigValidator::validate(&config);
    assert!(result.errors.iter().any(|e| e.message.contains("owner/name")));
}

#[test]
fn test_github_missing_secret_warns() {
    let mut config = Config::default();
    config.github.enabled = true;
    config.github.repo = Some("owner/repo".to_string());
    config.github.token = Some("t".to_string());

    let result = ConfigValidator::validate(&config);
    assert!(result.is_valid());
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].path, "github.webhook_secret");
}

#[test]
fn test_disabled_github_is_not_checked() {
    let mut config = Config::default();
    config.github.repo = Some("broken".to_string());

    let result = ConfigValidator::validate(&config);
    assert!(result.is_valid());
}

#[test]
fn test_into_result_reports_first_error() {
    let mut config = Config::default();
    config.sandbox.image = String::new();

    let err = ConfigValidator::validate(&config).into_result().unwrap_err();
    assert!(err.to_string().contains("sandbox.image"));
}

fn matrix_enabled() -> Config {
    let mut config = Config::default();
    config.matrix.enabled = true;
    config.matrix.user = "@agent:example.org".to_string();
    config.matrix.password = Some("secret".to_string());
    config
}

#[test]
fn test_matrix_complete_config_is_valid() {
    let result = ConfigValidator::validate(&matrix_enabled());
    assert!(result.is_valid());
    assert!(result.warnings.is_empty());
}

#[test]
fn test_matrix_requires_password_and_user_id() {
    let mut config = matrix_enabled();
    config.matrix.user = "agent".to_string();
    config.matrix.password = None;

    let result = ConfigValidator::validate(&config);
    let paths: Vec<&str> = result.errors.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["matrix.user", "matrix.password"]);
}

#[test]
fn test_matrix_homeserver_must_be_url() {
    let mut config = matrix_enabled();
    config.matrix.homeserver = "matrix.org".to_string();

    let result = ConfigValidator::validate(&config);
    assert!(result.errors.iter().any(|e| e.path == "matrix.homeserver"));
}

#[test]
fn test_disabled_matrix_is_not_checked() {
    let mut config = Config::default();
    config.matrix.user = "nobody".to_string();
    assert!(ConfigValidator::validate(&config).is_valid());
}
