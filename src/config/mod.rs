//! Configuration module for purgebot.
//!
//! The service is configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax. Every section is
//! optional; an empty file runs the defaults against the in-memory store.
//!
//! # Example
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//!
//! [scheduler]
//! tick_secs = 60
//!
//! [store]
//! type = "discord"
//! token = "${DISCORD_TOKEN}"
//! ```

mod observability;
mod purge;
mod scheduler;
mod server;
mod store;

use std::{path::Path, sync::LazyLock};

pub use observability::*;
pub use purge::*;
use regex::Regex;
pub use scheduler::*;
use serde::{Deserialize, Serialize};
pub use server::*;
pub use store::*;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PurgebotConfig {
    /// HTTP command surface.
    #[serde(default)]
    pub server: ServerConfig,

    /// Due-check loop.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Pagination and deletion settings.
    #[serde(default)]
    pub purge: PurgeConfig,

    /// Message store backend.
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl PurgebotConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing required variables will cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: PurgebotConfig = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()?;
        self.purge.validate()?;
        self.store.validate()?;
        Ok(())
    }

    /// Settings that are valid but worth flagging at startup.
    ///
    /// Returned rather than logged, since config is loaded before the
    /// tracing subscriber exists.
    pub fn warnings(&self) -> Vec<&'static str> {
        let mut warnings = Vec::new();
        if self.purge.dry_run {
            warnings.push("purge.dry_run is enabled: purges will be logged but nothing deleted");
        }
        warnings
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("static regex is valid"));

/// Expand `${VAR_NAME}` references from the environment.
/// Anything after a `#` on a line is a comment and left untouched.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());

    for (i, line) in input.lines().enumerate() {
        if i > 0 {
            result.push('\n');
        }

        let comment_pos = line.find('#').unwrap_or(line.len());
        let (code, comment) = line.split_at(comment_pos);

        let mut last_end = 0;
        for cap in ENV_VAR.captures_iter(code) {
            let Some(whole) = cap.get(0) else { continue };
            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

            result.push_str(&code[last_end..whole.start()]);
            result.push_str(&value);
            last_end = whole.end();
        }
        result.push_str(&code[last_end..]);
        result.push_str(comment);
    }

    if input.ends_with('\n') {
        result.push('\n');
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_empty_config_uses_memory_store() {
        let config = PurgebotConfig::from_str("").unwrap();
        assert!(matches!(config.store, StoreConfig::Memory));
        assert_eq!(config.scheduler.tick_secs, 60);
        assert_eq!(config.purge.page_size, 100);
    }

    #[test]
    fn test_full_config() {
        temp_env::with_var("PURGEBOT_TEST_TOKEN", Some("secret-token"), || {
            let config = PurgebotConfig::from_str(
                r#"
                [server]
                host = "0.0.0.0"
                port = 3000

                [scheduler]
                tick_secs = 30
                prevent_overlap = false

                [purge]
                dry_run = true

                [store]
                type = "discord"
                token = "${PURGEBOT_TEST_TOKEN}" # from the environment

                [store.retry]
                max_retries = 5

                [observability.logging]
                format = "json"
            "#,
            )
            .unwrap();

            assert_eq!(config.server.port, 3000);
            assert_eq!(config.scheduler.tick_secs, 30);
            assert!(!config.scheduler.prevent_overlap);
            assert!(config.purge.dry_run);
            let StoreConfig::Discord(discord) = &config.store else {
                panic!("expected discord store");
            };
            assert_eq!(discord.token, "secret-token");
            assert_eq!(discord.retry.max_retries, 5);
            assert_eq!(config.observability.logging.format, LogFormat::Json);
        });
    }

    #[test]
    fn test_dry_run_is_flagged() {
        assert!(PurgebotConfig::default().warnings().is_empty());

        let config = PurgebotConfig::from_str("[purge]\ndry_run = true\n").unwrap();
        let warnings = config.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("dry_run"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = PurgebotConfig::from_str(
            r#"
            [scheduler]
            tick_seconds = 30
        "#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validation_runs_on_load() {
        let result = PurgebotConfig::from_str(
            r#"
            [purge]
            batch_size = 1
        "#,
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_missing_env_var() {
        temp_env::with_var_unset("PURGEBOT_MISSING_VAR", || {
            let result = PurgebotConfig::from_str(
                r#"
                [store]
                type = "discord"
                token = "${PURGEBOT_MISSING_VAR}"
            "#,
            );
            assert!(
                matches!(result, Err(ConfigError::EnvVarNotFound(ref name)) if name == "PURGEBOT_MISSING_VAR")
            );
        });
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scheduler]\ntick_secs = 5").unwrap();

        let config = PurgebotConfig::from_file(file.path()).unwrap();
        assert_eq!(config.scheduler.tick_secs, 5);
    }

    #[test]
    fn test_from_missing_file() {
        let result = PurgebotConfig::from_file("/nonexistent/purgebot.toml");
        assert!(matches!(result, Err(ConfigError::Io(_, _))));
    }

    #[test]
    fn test_env_var_expansion() {
        temp_env::with_var("PURGEBOT_TEST_VALUE", Some("expanded"), || {
            let result = expand_env_vars("key = \"${PURGEBOT_TEST_VALUE}\"").unwrap();
            assert_eq!(result, "key = \"expanded\"");
        });
    }

    #[test]
    fn test_env_var_in_comment_ignored() {
        let result = expand_env_vars("# token = \"${NONEXISTENT_VAR}\"").unwrap();
        assert_eq!(result, "# token = \"${NONEXISTENT_VAR}\"");

        let result = expand_env_vars("key = \"value\" # ${NONEXISTENT_VAR}").unwrap();
        assert_eq!(result, "key = \"value\" # ${NONEXISTENT_VAR}");
    }

    #[test]
    fn test_multiline_keeps_layout() {
        temp_env::with_var("PURGEBOT_MULTI", Some("v1"), || {
            let input = "a = \"${PURGEBOT_MULTI}\"\n# b = \"${NONEXISTENT}\"\nc = 1\n";
            let result = expand_env_vars(input).unwrap();
            assert_eq!(result, "a = \"v1\"\n# b = \"${NONEXISTENT}\"\nc = 1\n");
        });
    }
}
