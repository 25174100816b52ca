//! Message store configuration.
//!
//! # Example
//!
//! ```toml
//! [store]
//! type = "discord"
//! token = "${DISCORD_TOKEN}"
//! timeout_secs = 30
//!
//! [store.retry]
//! max_retries = 5
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Which message store backs the purge engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// REST client against a Discord-compatible API.
    Discord(DiscordStoreConfig),
    /// Process-local store. Useful for local runs; never touches a real platform.
    Memory,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Memory
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            StoreConfig::Discord(cfg) => cfg.validate(),
            StoreConfig::Memory => Ok(()),
        }
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreConfig::Discord(_) => "discord",
            StoreConfig::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscordStoreConfig {
    /// API base URL, without trailing slash.
    /// Default: "https://discord.com/api/v10"
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bot token. Sent as `Authorization: Bot <token>`.
    pub token: String,

    /// Per-request timeout in seconds.
    /// Default: 30
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retry behaviour for rate limits and server errors.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_base_url() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl DiscordStoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.token.trim().is_empty() {
            return Err(ConfigError::Validation(
                "store.token must not be empty for the discord store".into(),
            ));
        }
        if url::Url::parse(&self.base_url).is_err() {
            return Err(ConfigError::Validation(format!(
                "store.base_url is not a valid URL: {}",
                self.base_url
            )));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "store.timeout_secs must be greater than 0".into(),
            ));
        }
        self.retry.validate()
    }
}

/// Retry configuration for store requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Whether retries are enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum number of retry attempts (not including the initial request).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial delay before first retry in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds. Also caps `Retry-After`.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (percentage, 0.0-1.0).
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// Status codes that should trigger a retry.
    /// Default: 429 (rate limit), 500, 502, 503, 504 (server errors).
    #[serde(default = "default_retryable_status_codes")]
    pub retryable_status_codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
            retryable_status_codes: default_retryable_status_codes(),
        }
    }
}

impl RetryConfig {
    /// Check if a status code should trigger a retry.
    pub fn should_retry_status(&self, status: u16) -> bool {
        self.enabled && self.retryable_status_codes.contains(&status)
    }

    /// Upper bound for any single wait.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Calculate the delay for a given retry attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay =
            (self.initial_delay_ms as f64) * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_delay_ms as f64);

        let jitter_range = capped_delay * self.jitter;
        let jitter = if jitter_range > 0.0 {
            use rand::Rng;
            rand::thread_rng().gen_range(-jitter_range..jitter_range)
        } else {
            0.0
        };

        let final_delay = (capped_delay + jitter).max(0.0);
        Duration::from_millis(final_delay as u64)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::Validation(
                "store.retry.jitter must be between 0.0 and 1.0".into(),
            ));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(ConfigError::Validation(
                "store.retry.backoff_multiplier must be at least 1.0".into(),
            ));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.1
}

fn default_retryable_status_codes() -> Vec<u16> {
    vec![429, 500, 502, 503, 504]
}
