//! Message store client.
//!
//! The purge engine never talks to the chat platform directly. It goes through
//! the [`MessageStore`] capability, which covers exactly three operations:
//!
//! - **List**: one page of channel history, newest first, optionally before a cursor
//! - **Delete**: remove a single message
//! - **Bulk delete**: remove 2–100 messages in one call (young messages only)
//!
//! Two implementations ship with the crate:
//!
//! - [`DiscordMessageStore`]: REST client for a Discord-compatible API
//! - [`InMemoryMessageStore`]: local store used for development and tests
//!
//! # Configuration
//!
//! ```toml
//! [store]
//! type = "discord"
//! token = "${DISCORD_TOKEN}"
//! ```

mod discord;
mod memory;
mod retry;

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
pub use discord::DiscordMessageStore;
pub use memory::{InMemoryMessageStore, StoreCall};
pub use retry::with_retry;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::StoreConfig;

/// Smallest number of ids the platform accepts in one bulk delete.
pub const MIN_BULK_DELETE: usize = 2;

/// Largest number of ids the platform accepts in one bulk delete.
pub const MAX_BULK_DELETE: usize = 100;

/// Largest page the platform returns from one history fetch.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Opaque channel identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ChannelId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Opaque message identifier, also used as the pagination cursor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A message as returned by the store. Only the fields the purge needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub channel_id: ChannelId,
    /// When the message was posted.
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        channel_id: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MessageId::new(id),
            channel_id: ChannelId::new(channel_id),
            created_at,
        }
    }

    /// Age of the message relative to `now`. Negative for clock skew.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Store returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to decode store response: {0}")]
    Decode(String),

    #[error("Invalid store request: {0}")]
    InvalidRequest(String),
}

impl StoreError {
    /// HTTP status of the failure, if the store answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::Status { status, .. } => Some(*status),
            StoreError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Capability interface over the chat platform's message history.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Fetch up to `limit` messages, newest first.
    ///
    /// With `before` set, only messages older than that message are returned.
    async fn list_messages(
        &self,
        channel_id: &ChannelId,
        limit: u32,
        before: Option<&MessageId>,
    ) -> Result<Vec<Message>, StoreError>;

    /// Delete a single message.
    async fn delete_message(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
    ) -> Result<(), StoreError>;

    /// Delete 2–100 messages in one request.
    async fn bulk_delete_messages(
        &self,
        channel_id: &ChannelId,
        message_ids: &[MessageId],
    ) -> Result<(), StoreError>;
}

/// Reject bulk requests the platform would refuse anyway.
pub(crate) fn check_bulk_size(message_ids: &[MessageId]) -> Result<(), StoreError> {
    if !(MIN_BULK_DELETE..=MAX_BULK_DELETE).contains(&message_ids.len()) {
        return Err(StoreError::InvalidRequest(format!(
            "bulk delete takes between {} and {} ids, got {}",
            MIN_BULK_DELETE,
            MAX_BULK_DELETE,
            message_ids.len()
        )));
    }
    Ok(())
}

/// Build the configured store implementation.
pub fn build_store(
    config: &StoreConfig,
    max_bulk_age: chrono::Duration,
) -> Result<Arc<dyn MessageStore>, StoreError> {
    let store: Arc<dyn MessageStore> = match config {
        StoreConfig::Discord(cfg) => Arc::new(DiscordMessageStore::from_config(cfg)?),
        StoreConfig::Memory => {
            tracing::warn!("Using in-memory message store; nothing will be deleted on a real platform");
            Arc::new(InMemoryMessageStore::new().with_max_bulk_age(max_bulk_age))
        }
    };
    Ok(store)
}
