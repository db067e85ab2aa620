//! Configuration loader.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::ConfigError;
use crate::schema::Config;

/// Configuration loader with environment variable substitution.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    /// Load from `path`, or fall back to defaults when the file is absent.
    pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::NotFound(_)) => Ok(Config::default()),
            other => other,
        }
    }

    /// Load configuration from a string.
    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let mut config: Config = toml::from_str(&expanded)?;
        Self::expand_paths(&mut config);
        Ok(config)
    }

    /// Expand environment variables in the format `${VAR}`.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        static ENV_VAR: OnceLock<Regex> = OnceLock::new();
        let re = ENV_VAR.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("static pattern"));

        let mut result = content.to_string();
        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let var_value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotSet(var_name.to_string()))?;
            result = result.replace(&cap[0], &var_value);
        }

        Ok(result)
    }

    fn expand_paths(config: &mut Config) {
        config.state.path = Self::expand_pathbuf(&config.state.path);
        config.sandbox.ipc_base_dir = Self::expand_pathbuf(&config.sandbox.ipc_base_dir);
        if let Some(dir) = config.logging.dir.take() {
            config.logging.dir = Some(Self::expand_pathbuf(&dir));
        }
    }

    fn expand_pathbuf(path: &Path) -> PathBuf {
        PathBuf::from(Self::expand_path(&path.to_string_lossy()))
    }

    /// Expand shell-style paths (e.g., `~/.agentroom`).
    pub fn expand_path(path: &str) -> String {
        shellexpand::tilde(path).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_empty_config() {
        let config = ConfigLoader::load_str("").unwrap();
        assert_eq!(config.runner.reconcile_interval_secs, 60);
    }

    #[test]
    fn test_expand_path() {
        let expanded = ConfigLoader::expand_path("~/.agentroom");
        assert!(!expanded.starts_with('~'));
    }

    #[test]
    fn test_state_path_tilde_is_expanded() {
        let config = ConfigLoader::load_str(
            r#"
            [state]
            path = "~/agentroom/state.json"
            "#,
        )
        .unwrap();
        assert!(!config.state.path.to_string_lossy().starts_with('~'));
        assert!(config.state.path.ends_with("agentroom/state.json"));
    }

    #[test]
    fn test_load_full_config() {
        let content = r#"
            [runner]
            reconcile_interval_secs = 15

            [sandbox]
            image = "custom:1"
            command_timeout_secs = 30

            [agent]
            program = "claude"
            args = ["-p"]

            [github]
            enabled = true
            repo = "owner/repo"
            port = 9000

            [logging]
            level = "debug"
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.runner.reconcile_interval_secs, 15);
        assert_eq!(config.sandbox.image, "custom:1");
        assert_eq!(config.agent.program, "claude");
        assert_eq!(config.agent.args, vec!["-p".to_string()]);
        assert_eq!(config.github.port, 9000);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[runner]").unwrap();
        writeln!(file, "reconcile_interval_secs = 5").unwrap();

        let config = ConfigLoader::load(file.path()).unwrap();
        assert_eq!(config.runner.reconcile_interval_secs, 5);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = ConfigLoader::load(Path::new("/nonexistent/path/agentroom.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_or_default_falls_back() {
        let config =
            ConfigLoader::load_or_default(Path::new("/nonexistent/path/agentroom.toml")).unwrap();
        assert_eq!(config.agent.chunk_size, 800);
    }

    #[test]
    fn test_load_invalid_toml() {
        let result = ConfigLoader::load_str("invalid = [unclosed");
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn test_expand_env_vars() {
        // SAFETY: This test runs in isolation and sets a unique test-only env var
        unsafe {
            std::env::set_var("AGENTROOM_TEST_TOKEN", "secret-value");
        }
        let content = "token = \"${AGENTROOM_TEST_TOKEN}\"";
        let expanded = ConfigLoader::expand_env_vars(content).unwrap();
        assert!(expanded.contains("secret-value"));
        unsafe {
            std::env::remove_var("AGENTROOM_TEST_TOKEN");
        }
    }

    #[test]
    fn test_expand_env_vars_not_set() {
        let content = "value = \"${AGENTROOM_NONEXISTENT_VAR_12345}\"";
        let result = ConfigLoader::expand_env_vars(content);
        assert!(matches!(result, Err(ConfigError::EnvVarNotSet(_))));
    }

    #[test]
    fn test_expand_env_vars_no_vars() {
        let content = "value = \"no variables here\"";
        let expanded = ConfigLoader::expand_env_vars(content).unwrap();
        assert_eq!(expanded, content);
    }
}
