//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::Config;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Turn the first error into a [`ConfigError`].
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(ConfigError::InvalidValue {
                field: error.path,
                message: error.message,
            }),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_runner(config, &mut result);
        Self::validate_sandbox(config, &mut result);
        Self::validate_agent(config, &mut result);
        Self::validate_github(config, &mut result);
        Self::validate_matrix(config, &mut result);

        result
    }

    fn validate_runner(config: &Config, result: &mut ValidationResult) {
        if config.runner.reconcile_interval_secs == 0 {
            result.add_error(ValidationError::new(
                "runner.reconcile_interval_secs",
                "must be greater than 0",
            ));
        }
    }

    fn validate_sandbox(config: &Config, result: &mut ValidationResult) {
        if config.sandbox.image.trim().is_empty() {
            result.add_error(ValidationError::new("sandbox.image", "must not be empty"));
        }
        if config.sandbox.command_timeout_secs == 0 {
            result.add_error(ValidationError::new(
                "sandbox.command_timeout_secs",
                "must be greater than 0",
            ));
        }
    }

    fn validate_agent(config: &Config, result: &mut ValidationResult) {
        if config.agent.program.trim().is_empty() {
            result.add_error(ValidationError::new("agent.program", "must not be empty"));
        }
        if config.agent.chunk_size == 0 {
            result.add_error(ValidationError::new(
                "agent.chunk_size",
                "must be greater than 0",
            ));
        }
        if config.agent.timeout_secs == 0 {
            result.add_error(ValidationError::new(
                "agent.timeout_secs",
                "must be greater than 0",
            ));
        }
    }

    fn validate_github(config: &Config, result: &mut ValidationResult) {
        let github = &config.github;
        if !github.enabled {
            return;
        }

        match github.repo.as_deref() {
            None => result.add_error(ValidationError::new(
                "github.repo",
                "required when the GitHub channel is enabled",
            )),
            Some(repo) if !is_owner_slash_name(repo) => result.add_error(ValidationError::new(
                "github.repo",
                format!("expected owner/name, got {repo}"),
            )),
            Some(_) => {}
        }

        if github.port == 0 {
            result.add_error(ValidationError::new("github.port", "must not be 0"));
        }
        if github.webhook_secret.is_none() {
            result.add_warning(ValidationWarning::new(
                "github.webhook_secret",
                "webhook payloads will not be verified",
            ));
        }
        if github.token.is_none() {
            result.add_warning(ValidationWarning::new(
                "github.token",
                "comments cannot be posted and issue checks are unauthenticated",
            ));
        }
    }

    fn validate_matrix(config: &Config, result: &mut ValidationResult) {
        let matrix = &config.matrix;
        if !matrix.enabled {
            return;
        }

        if !matrix.homeserver.starts_with("http://") && !matrix.homeserver.starts_with("https://") {
            result.add_error(ValidationError::new(
                "matrix.homeserver",
                format!("expected an http(s) URL, got {}", matrix.homeserver),
            ));
        }
        if !is_matrix_user_id(&matrix.user) {
            result.add_error(ValidationError::new(
                "matrix.user",
                format!("expected @name:server, got {:?}", matrix.user),
            ));
        }
        if matrix.password.as_deref().is_none_or(str::is_empty) {
            result.add_error(ValidationError::new(
                "matrix.password",
                "required when the Matrix channel is enabled",
            ));
        }
        if matrix.sync_timeout_secs == 0 {
            result.add_warning(ValidationWarning::new(
                "matrix.sync_timeout_secs",
                "0 turns long polling off",
            ));
        }
    }
}

fn is_matrix_user_id(user: &str) -> bool {
    match user.strip_prefix('@').and_then(|rest| rest.split_once(':')) {
        Some((name, server)) => !name.is_empty() && !server.is_empty(),
        None => false,
    }
}

fn is_owner_slash_name(repo: &str) -> bool {
    match repo.split_once('/') {
        Some((owner, name)) => !owner.is_empty() && !name.is_empty() && !name.contains('/'),
        None => false,
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
