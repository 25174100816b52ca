//! Scheduler configuration.
//!
//! # Example
//!
//! ```toml
//! [scheduler]
//! tick_secs = 60
//! prevent_overlap = true
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// How often the registry is scanned for due tasks (in seconds).
    /// Default: 60
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,

    /// Skip a due channel while its previous purge is still running.
    /// The skipped channel is still rescheduled for the next interval.
    /// Default: true
    #[serde(default = "default_true")]
    pub prevent_overlap: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            prevent_overlap: true,
        }
    }
}

impl SchedulerConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_secs == 0 {
            return Err(ConfigError::Validation(
                "scheduler.tick_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_tick_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}
