//! Purge executor configuration.
//!
//! # Example
//!
//! ```toml
//! [purge]
//! page_size = 100
//! batch_size = 100
//! bulk_delete_max_age_days = 14
//! dry_run = false
//! ```

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::store::{MAX_BULK_DELETE, MAX_PAGE_SIZE, MIN_BULK_DELETE};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PurgeConfig {
    /// Messages requested per history page.
    /// Default: 100 (the platform maximum)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Messages considered per deletion chunk. Bounded by the bulk-delete ceiling.
    /// Default: 100
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Age at which messages can no longer be bulk deleted (in days).
    /// Default: 14
    #[serde(default = "default_bulk_delete_max_age_days")]
    pub bulk_delete_max_age_days: u32,

    /// If true, log what would be deleted without issuing any delete.
    /// Default: false
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            batch_size: default_batch_size(),
            bulk_delete_max_age_days: default_bulk_delete_max_age_days(),
            dry_run: false,
        }
    }
}

impl PurgeConfig {
    pub fn bulk_delete_max_age(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.bulk_delete_max_age_days))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(ConfigError::Validation(format!(
                "purge.page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        if !(MIN_BULK_DELETE..=MAX_BULK_DELETE).contains(&self.batch_size) {
            return Err(ConfigError::Validation(format!(
                "purge.batch_size must be between {MIN_BULK_DELETE} and {MAX_BULK_DELETE}"
            )));
        }
        if self.bulk_delete_max_age_days == 0 {
            return Err(ConfigError::Validation(
                "purge.bulk_delete_max_age_days must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_page_size() -> u32 {
    100
}

fn default_batch_size() -> usize {
    100
}

fn default_bulk_delete_max_age_days() -> u32 {
    14
}
