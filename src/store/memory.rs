//! In-memory message store.
//!
//! Holds channel history in process memory and applies the same rules the
//! platform does: pages come back newest first, bulk deletes take 2–100 ids
//! and refuse messages past the age threshold, deleting an unknown message
//! is a 404. Every call is journalled so tests can assert on the exact
//! sequence of requests a purge issued.

use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;

use super::{
    ChannelId, MAX_PAGE_SIZE, Message, MessageId, MessageStore, StoreError, check_bulk_size,
};

/// One request received by the store, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    List {
        channel_id: ChannelId,
        before: Option<MessageId>,
    },
    Delete {
        channel_id: ChannelId,
        message_id: MessageId,
    },
    BulkDelete {
        channel_id: ChannelId,
        message_ids: Vec<MessageId>,
    },
}

#[derive(Debug, Default)]
struct Failures {
    /// Fail every list call from this 0-based call index onwards.
    list_from: Option<usize>,
    delete_ids: HashSet<MessageId>,
    bulk: bool,
}

#[derive(Debug)]
pub struct InMemoryMessageStore {
    /// Newest first per channel.
    channels: RwLock<HashMap<ChannelId, Vec<Message>>>,
    calls: Mutex<Vec<StoreCall>>,
    failures: Mutex<Failures>,
    max_bulk_age: chrono::Duration,
    list_delay: Option<Duration>,
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(Failures::default()),
            max_bulk_age: chrono::Duration::days(14),
            list_delay: None,
        }
    }

    /// Age at or beyond which bulk deletes are refused.
    pub fn with_max_bulk_age(mut self, max_age: chrono::Duration) -> Self {
        self.max_bulk_age = max_age;
        self
    }

    /// Sleep before answering each list call. Lets tests keep a purge in flight.
    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = Some(delay);
        self
    }

    /// Add messages to a channel. Order of the input does not matter.
    pub fn seed(&self, channel_id: &ChannelId, messages: impl IntoIterator<Item = Message>) {
        let mut channels = self.channels.write().expect("RwLock poisoned");
        let history = channels.entry(channel_id.clone()).or_default();
        history.extend(messages);
        // Stable, so equal timestamps keep insertion order.
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }

    /// Messages still present in a channel, newest first.
    pub fn messages(&self, channel_id: &ChannelId) -> Vec<Message> {
        self.channels
            .read()
            .expect("RwLock poisoned")
            .get(channel_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Journal of every call received so far.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().expect("Mutex poisoned").clone()
    }

    pub fn fail_list_from(&self, call_index: usize) {
        self.failures.lock().expect("Mutex poisoned").list_from = Some(call_index);
    }

    pub fn fail_delete(&self, message_id: impl Into<MessageId>) {
        self.failures
            .lock()
            .expect("Mutex poisoned")
            .delete_ids
            .insert(message_id.into());
    }

    pub fn fail_bulk_deletes(&self) {
        self.failures.lock().expect("Mutex poisoned").bulk = true;
    }

    /// Record a call and return how many calls of the same kind came before it.
    fn record(&self, call: StoreCall) -> usize {
        let mut calls = self.calls.lock().expect("Mutex poisoned");
        let same_kind = calls
            .iter()
            .filter(|c| std::mem::discriminant(*c) == std::mem::discriminant(&call))
            .count();
        calls.push(call);
        same_kind
    }

    fn injected_error(what: &str) -> StoreError {
        StoreError::Status {
            status: 500,
            message: format!("injected {what} failure"),
        }
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn list_messages(
        &self,
        channel_id: &ChannelId,
        limit: u32,
        before: Option<&MessageId>,
    ) -> Result<Vec<Message>, StoreError> {
        let index = self.record(StoreCall::List {
            channel_id: channel_id.clone(),
            before: before.cloned(),
        });

        if let Some(delay) = self.list_delay {
            tokio::time::sleep(delay).await;
        }

        let fail = self
            .failures
            .lock()
            .expect("Mutex poisoned")
            .list_from
            .is_some_and(|from| index >= from);
        if fail {
            return Err(Self::injected_error("list"));
        }

        let limit = limit.clamp(1, MAX_PAGE_SIZE) as usize;
        let channels = self.channels.read().expect("RwLock poisoned");
        let Some(history) = channels.get(channel_id) else {
            return Ok(Vec::new());
        };

        let start = match before {
            Some(cursor) => match history.iter().position(|m| &m.id == cursor) {
                Some(pos) => pos + 1,
                None => return Ok(Vec::new()),
            },
            None => 0,
        };

        Ok(history.iter().skip(start).take(limit).cloned().collect())
    }

    async fn delete_message(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
    ) -> Result<(), StoreError> {
        self.record(StoreCall::Delete {
            channel_id: channel_id.clone(),
            message_id: message_id.clone(),
        });

        if self
            .failures
            .lock()
            .expect("Mutex poisoned")
            .delete_ids
            .contains(message_id)
        {
            return Err(Self::injected_error("delete"));
        }

        let mut channels = self.channels.write().expect("RwLock poisoned");
        let history = channels.entry(channel_id.clone()).or_default();
        match history.iter().position(|m| &m.id == message_id) {
            Some(pos) => {
                history.remove(pos);
                Ok(())
            }
            None => Err(StoreError::Status {
                status: 404,
                message: "Unknown Message".into(),
            }),
        }
    }

    async fn bulk_delete_messages(
        &self,
        channel_id: &ChannelId,
        message_ids: &[MessageId],
    ) -> Result<(), StoreError> {
        self.record(StoreCall::BulkDelete {
            channel_id: channel_id.clone(),
            message_ids: message_ids.to_vec(),
        });

        check_bulk_size(message_ids)?;

        if self.failures.lock().expect("Mutex poisoned").bulk {
            return Err(Self::injected_error("bulk delete"));
        }

        let now = Utc::now();
        let wanted: HashSet<&MessageId> = message_ids.iter().collect();
        let mut channels = self.channels.write().expect("RwLock poisoned");
        let history = channels.entry(channel_id.clone()).or_default();

        if history
            .iter()
            .any(|m| wanted.contains(&m.id) && m.age(now) >= self.max_bulk_age)
        {
            return Err(StoreError::Status {
                status: 400,
                message: format!(
                    "You can only bulk delete messages that are under {} days old.",
                    self.max_bulk_age.num_days()
                ),
            });
        }

        history.retain(|m| !wanted.contains(&m.id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> ChannelId {
        ChannelId::from("chan")
    }

    /// `count` messages, id `m{i}`, each one minute older than the last.
    fn history(count: usize) -> Vec<Message> {
        let now = Utc::now();
        (0..count)
            .map(|i| {
                Message::new(
                    format!("m{i}"),
                    "chan",
                    now - chrono::Duration::minutes(i as i64 + 1),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_pages_newest_first_with_cursor() {
        let store = InMemoryMessageStore::new();
        store.seed(&channel(), history(5).into_iter().rev());

        let first = store.list_messages(&channel(), 2, None).await.unwrap();
        let ids: Vec<_> = first.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m0", "m1"]);

        let second = store
            .list_messages(&channel(), 2, Some(&first[1].id))
            .await
            .unwrap();
        let ids: Vec<_> = second.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m2", "m3"]);

        let last = store
            .list_messages(&channel(), 2, Some(&second[1].id))
            .await
            .unwrap();
        assert_eq!(last.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_channel_is_empty() {
        let store = InMemoryMessageStore::new();
        let page = store.list_messages(&channel(), 100, None).await.unwrap();
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_message_and_404s_on_repeat() {
        let store = InMemoryMessageStore::new();
        store.seed(&channel(), history(2));

        store
            .delete_message(&channel(), &MessageId::from("m0"))
            .await
            .unwrap();
        assert_eq!(store.messages(&channel()).len(), 1);

        let err = store
            .delete_message(&channel(), &MessageId::from("m0"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_bulk_delete_refuses_old_messages() {
        let store = InMemoryMessageStore::new();
        let now = Utc::now();
        store.seed(
            &channel(),
            [
                Message::new("young", "chan", now - chrono::Duration::days(1)),
                Message::new("old", "chan", now - chrono::Duration::days(20)),
            ],
        );

        let err = store
            .bulk_delete_messages(
                &channel(),
                &[MessageId::from("young"), MessageId::from("old")],
            )
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert_eq!(store.messages(&channel()).len(), 2);
    }

    #[tokio::test]
    async fn test_bulk_delete_enforces_size() {
        let store = InMemoryMessageStore::new();
        store.seed(&channel(), history(1));
        let err = store
            .bulk_delete_messages(&channel(), &[MessageId::from("m0")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_journal_and_failure_injection() {
        let store = InMemoryMessageStore::new();
        store.seed(&channel(), history(3));
        store.fail_list_from(1);
        store.fail_delete("m2");

        assert!(store.list_messages(&channel(), 100, None).await.is_ok());
        assert!(store.list_messages(&channel(), 100, None).await.is_err());
        assert!(
            store
                .delete_message(&channel(), &MessageId::from("m2"))
                .await
                .is_err()
        );

        let calls = store.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[2],
            StoreCall::Delete {
                channel_id: channel(),
                message_id: MessageId::from("m2"),
            }
        );
        // Injected failures leave the history alone.
        assert_eq!(store.messages(&channel()).len(), 3);
    }
}
