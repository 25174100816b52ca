//! Purge executor: wipes a channel's history through the message store.
//!
//! A run has two phases:
//!
//! 1. **Pagination**: fetch pages newest to oldest, using the oldest id of
//!    each page as the cursor for the next, until a page comes back short.
//! 2. **Deletion**: walk the collected history in chunks of `batch_size`.
//!    Each chunk is split by [`ChunkPlan`]: old messages are deleted one by
//!    one, young ones with a single bulk request (or a single delete when
//!    only one is young).
//!
//! Failures never abort a run. A failed page fetch ends pagination and the
//! run deletes what it already has; a failed delete is logged and counted.
//! Nothing is returned to the caller except the [`PurgeRunResult`] tally.

mod plan;

use std::{sync::Arc, time::Instant};

use chrono::{DateTime, Utc};
pub use plan::{BulkAction, ChunkPlan};
use serde::Serialize;

use crate::{
    config::PurgeConfig,
    store::{ChannelId, Message, MessageId, MessageStore},
};

/// Tally of one purge run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeRunResult {
    /// Messages collected during pagination.
    pub messages_found: u64,
    /// History pages requested, including the failed or empty last one.
    pub pages_fetched: u64,
    /// Bulk delete requests issued.
    pub bulk_requests: u64,
    /// Messages removed through bulk requests.
    pub bulk_deleted: u64,
    /// Messages removed through single deletes.
    pub single_deleted: u64,
    /// Messages whose delete (single or bulk) failed.
    pub failed_deletes: u64,
    /// False when pagination stopped on an error.
    pub history_complete: bool,
    pub dry_run: bool,
    pub duration_ms: u64,
}

impl PurgeRunResult {
    pub fn total_deleted(&self) -> u64 {
        self.bulk_deleted + self.single_deleted
    }

    pub fn has_failures(&self) -> bool {
        self.failed_deletes > 0 || !self.history_complete
    }
}

pub struct PurgeExecutor {
    store: Arc<dyn MessageStore>,
    config: PurgeConfig,
}

impl PurgeExecutor {
    pub fn new(store: Arc<dyn MessageStore>, config: PurgeConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &PurgeConfig {
        &self.config
    }

    /// Purge `channel_id` using the wall clock for message ages.
    pub async fn run(&self, channel_id: &ChannelId) -> PurgeRunResult {
        self.run_at(channel_id, Utc::now()).await
    }

    /// Purge `channel_id`, judging message ages against `now`.
    pub async fn run_at(&self, channel_id: &ChannelId, now: DateTime<Utc>) -> PurgeRunResult {
        self.run_limited_at(channel_id, now, None).await
    }

    /// Delete at most `limit` of the newest messages in `channel_id`.
    /// `None` wipes the whole history.
    pub async fn run_limited(&self, channel_id: &ChannelId, limit: Option<usize>) -> PurgeRunResult {
        self.run_limited_at(channel_id, Utc::now(), limit).await
    }

    #[tracing::instrument(
        name = "purge.run",
        skip_all,
        fields(channel_id = %channel_id, limit = ?limit)
    )]
    pub async fn run_limited_at(
        &self,
        channel_id: &ChannelId,
        now: DateTime<Utc>,
        limit: Option<usize>,
    ) -> PurgeRunResult {
        let started = Instant::now();
        let mut result = PurgeRunResult {
            dry_run: self.config.dry_run,
            ..Default::default()
        };

        let history = self.collect_history(channel_id, limit, &mut result).await;
        result.messages_found = history.len() as u64;

        let max_age = self.config.bulk_delete_max_age();
        for chunk in history.chunks(self.config.batch_size) {
            let plan = ChunkPlan::partition(chunk, now, max_age);
            self.execute_plan(channel_id, plan, &mut result).await;
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        result
    }

    /// Walk the channel backwards from the newest message, stopping once
    /// `limit` messages are collected.
    async fn collect_history(
        &self,
        channel_id: &ChannelId,
        limit: Option<usize>,
        result: &mut PurgeRunResult,
    ) -> Vec<Message> {
        let mut history: Vec<Message> = Vec::new();
        let mut cursor: Option<MessageId> = None;
        result.history_complete = true;

        loop {
            let page_size = match limit {
                Some(limit) => {
                    let remaining = limit.saturating_sub(history.len());
                    if remaining == 0 {
                        break;
                    }
                    self.config.page_size.min(remaining as u32)
                }
                None => self.config.page_size,
            };

            result.pages_fetched += 1;
            let page = match self
                .store
                .list_messages(channel_id, page_size, cursor.as_ref())
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(
                        channel_id = %channel_id,
                        collected = history.len(),
                        before = cursor.as_ref().map(|c| c.as_str()),
                        error = %e,
                        "Failed to fetch message page, purging what was collected"
                    );
                    result.history_complete = false;
                    break;
                }
            };

            let fetched = page.len();
            if let Some(oldest) = page.last() {
                cursor = Some(oldest.id.clone());
            }
            history.extend(page);
            if let Some(limit) = limit {
                history.truncate(limit);
            }

            tracing::debug!(
                channel_id = %channel_id,
                fetched = fetched,
                total = history.len(),
                "Fetched message page"
            );

            if fetched < page_size as usize {
                break;
            }
        }

        history
    }

    async fn execute_plan(
        &self,
        channel_id: &ChannelId,
        plan: ChunkPlan,
        result: &mut PurgeRunResult,
    ) {
        if self.config.dry_run {
            tracing::info!(
                channel_id = %channel_id,
                individual = plan.individual.len(),
                bulk = plan.bulk.len(),
                "DRY RUN: Would delete chunk of {} messages",
                plan.message_count()
            );
            return;
        }

        for message_id in &plan.individual {
            self.delete_one(channel_id, message_id, result).await;
        }

        match plan.bulk {
            BulkAction::None => {}
            BulkAction::Single(message_id) => {
                self.delete_one(channel_id, &message_id, result).await;
            }
            BulkAction::Bulk(message_ids) => {
                result.bulk_requests += 1;
                match self
                    .store
                    .bulk_delete_messages(channel_id, &message_ids)
                    .await
                {
                    Ok(()) => {
                        result.bulk_deleted += message_ids.len() as u64;
                    }
                    Err(e) => {
                        tracing::warn!(
                            channel_id = %channel_id,
                            count = message_ids.len(),
                            first_message_id = %message_ids[0],
                            error = %e,
                            "Bulk delete failed"
                        );
                        result.failed_deletes += message_ids.len() as u64;
                    }
                }
            }
        }
    }

    async fn delete_one(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
        result: &mut PurgeRunResult,
    ) {
        match self.store.delete_message(channel_id, message_id).await {
            Ok(()) => result.single_deleted += 1,
            Err(e) => {
                tracing::warn!(
                    channel_id = %channel_id,
                    message_id = %message_id,
                    error = %e,
                    "Message delete failed"
                );
                result.failed_deletes += 1;
            }
        }
    }
}

impl std::fmt::Debug for PurgeExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PurgeExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
