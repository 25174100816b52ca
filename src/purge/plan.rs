//! Splitting one chunk of history into delete requests.
//!
//! The platform only bulk deletes messages younger than a fixed age and
//! only in groups of two or more. Everything else goes out one by one.

use chrono::{DateTime, Utc};

use crate::store::{Message, MessageId};

/// What to do with the young part of a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkAction {
    /// No young messages.
    None,
    /// Exactly one young message; bulk delete needs at least two ids.
    Single(MessageId),
    /// Two or more young messages, deleted in one request.
    Bulk(Vec<MessageId>),
}

impl BulkAction {
    pub fn len(&self) -> usize {
        match self {
            BulkAction::None => 0,
            BulkAction::Single(_) => 1,
            BulkAction::Bulk(ids) => ids.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, BulkAction::None)
    }
}

/// Delete requests for one chunk. Order within each part follows the chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    /// Messages at or past the age threshold.
    pub individual: Vec<MessageId>,
    pub bulk: BulkAction,
}

impl ChunkPlan {
    pub fn partition(chunk: &[Message], now: DateTime<Utc>, max_age: chrono::Duration) -> Self {
        let (old, young): (Vec<&Message>, Vec<&Message>) =
            chunk.iter().partition(|m| m.age(now) >= max_age);

        let individual = old.into_iter().map(|m| m.id.clone()).collect();
        let mut young: Vec<MessageId> = young.into_iter().map(|m| m.id.clone()).collect();

        let bulk = match young.len() {
            0 => BulkAction::None,
            1 => BulkAction::Single(young.remove(0)),
            _ => BulkAction::Bulk(young),
        };

        Self { individual, bulk }
    }

    /// Messages this plan covers.
    pub fn message_count(&self) -> usize {
        self.individual.len() + self.bulk.len()
    }
}
