//! REST client for a Discord-compatible message API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;

use super::{
    ChannelId, MAX_PAGE_SIZE, Message, MessageId, MessageStore, StoreError, check_bulk_size,
    retry::with_retry,
};
use crate::config::{DiscordStoreConfig, RetryConfig};

const USER_AGENT_VALUE: &str = concat!(
    "DiscordBot (https://github.com/purgebot/purgebot, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);

#[derive(Debug, Serialize)]
struct BulkDeleteBody<'a> {
    messages: &'a [MessageId],
}

pub struct DiscordMessageStore {
    client: reqwest::Client,
    base_url: String,
    retry: RetryConfig,
}

impl DiscordMessageStore {
    pub fn from_config(config: &DiscordStoreConfig) -> Result<Self, StoreError> {
        let mut auth = HeaderValue::from_str(&format!("Bot {}", config.token))
            .map_err(|e| StoreError::InvalidRequest(format!("invalid bot token: {e}")))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry: config.retry.clone(),
        })
    }

    fn messages_url(&self, channel_id: &ChannelId) -> String {
        format!("{}/channels/{}/messages", self.base_url, channel_id)
    }
}

impl std::fmt::Debug for DiscordMessageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordMessageStore")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Turn a non-success response into `StoreError::Status`, keeping the body for logs.
async fn error_from_response(response: reqwest::Response) -> StoreError {
    let status = response.status().as_u16();
    let message = response
        .text()
        .await
        .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
    StoreError::Status { status, message }
}

#[async_trait]
impl MessageStore for DiscordMessageStore {
    #[tracing::instrument(skip(self), fields(store = "discord"))]
    async fn list_messages(
        &self,
        channel_id: &ChannelId,
        limit: u32,
        before: Option<&MessageId>,
    ) -> Result<Vec<Message>, StoreError> {
        let url = self.messages_url(channel_id);
        let limit = limit.clamp(1, MAX_PAGE_SIZE).to_string();

        let response = with_retry(&self.retry, "list_messages", || {
            let mut req = self.client.get(&url).query(&[("limit", limit.as_str())]);
            if let Some(before) = before {
                req = req.query(&[("before", before.as_str())]);
            }
            req.send()
        })
        .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Decode(e.to_string()))
    }

    #[tracing::instrument(skip(self), fields(store = "discord"))]
    async fn delete_message(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
    ) -> Result<(), StoreError> {
        let url = format!("{}/{}", self.messages_url(channel_id), message_id);

        let response =
            with_retry(&self.retry, "delete_message", || self.client.delete(&url).send()).await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, message_ids), fields(store = "discord", count = message_ids.len()))]
    async fn bulk_delete_messages(
        &self,
        channel_id: &ChannelId,
        message_ids: &[MessageId],
    ) -> Result<(), StoreError> {
        check_bulk_size(message_ids)?;

        let url = format!("{}/bulk-delete", self.messages_url(channel_id));
        let body = serde_json::to_vec(&BulkDeleteBody {
            messages: message_ids,
        })
        .map_err(|e| StoreError::InvalidRequest(e.to_string()))?;

        let response = with_retry(&self.retry, "bulk_delete_messages", || {
            self.client
                .post(&url)
                .header("content-type", "application/json")
                .body(body.clone())
                .send()
        })
        .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }
}
