//! Per-channel purge schedules.
//!
//! [`TaskRegistry`] is the only mutable state shared between the command
//! surface (writes schedules) and the scheduler loop (reads due tasks and
//! advances them). A single `RwLock` guards the whole map, so one `set`,
//! `clear` or `take_due` is atomic with respect to every other operation.
//!
//! The handle is cheap to clone; all clones share the same map.
//!
//! ```ignore
//! let registry = TaskRegistry::new();
//! registry.set(channel.clone(), PurgeInterval::from_hours(6).unwrap());
//!
//! // In the scheduler tick:
//! for channel in registry.take_due(Utc::now()) {
//!     // launch a purge for `channel`
//! }
//! ```

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, RwLock},
};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::store::ChannelId;

/// A strictly positive purge interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PurgeInterval(chrono::Duration);

impl PurgeInterval {
    /// `None` for zero, negative or out-of-range durations.
    pub fn new(duration: chrono::Duration) -> Option<Self> {
        (duration > chrono::Duration::zero()).then_some(Self(duration))
    }

    pub fn from_hours(hours: u32) -> Option<Self> {
        chrono::Duration::try_hours(i64::from(hours)).and_then(Self::new)
    }

    pub fn from_days(days: u32) -> Option<Self> {
        chrono::Duration::try_days(i64::from(days)).and_then(Self::new)
    }

    pub fn as_duration(&self) -> chrono::Duration {
        self.0
    }

    pub fn as_secs(&self) -> i64 {
        self.0.num_seconds()
    }
}

impl fmt::Display for PurgeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.num_seconds();
        if secs % 86_400 == 0 {
            write!(f, "{}d", secs / 86_400)
        } else if secs % 3_600 == 0 {
            write!(f, "{}h", secs / 3_600)
        } else {
            write!(f, "{secs}s")
        }
    }
}

/// One channel's retention schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeTask {
    pub interval: PurgeInterval,
    pub next_due: DateTime<Utc>,
}

impl PurgeTask {
    /// A fresh task, first due one interval from `now`.
    pub fn new(interval: PurgeInterval, now: DateTime<Utc>) -> Self {
        Self {
            interval,
            next_due: due_after(now, interval),
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_due <= now
    }

    /// Reschedule to `now + interval`. Never moves `next_due` backwards.
    pub fn advance(&mut self, now: DateTime<Utc>) {
        self.next_due = self.next_due.max(due_after(now, self.interval));
    }
}

/// `now + interval`, saturating at the largest representable instant.
fn due_after(now: DateTime<Utc>, interval: PurgeInterval) -> DateTime<Utc> {
    now.checked_add_signed(interval.as_duration())
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Serializable view of a task, used by the HTTP surface.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TaskView {
    pub channel_id: ChannelId,
    pub interval_secs: i64,
    pub next_due: DateTime<Utc>,
}

impl TaskView {
    pub fn new(channel_id: ChannelId, task: &PurgeTask) -> Self {
        Self {
            channel_id,
            interval_secs: task.interval.as_secs(),
            next_due: task.next_due,
        }
    }
}

/// Shared map from channel to its purge schedule.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<RwLock<HashMap<ChannelId, PurgeTask>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the task for `channel_id`, first due one interval from now.
    pub fn set(&self, channel_id: ChannelId, interval: PurgeInterval) -> PurgeTask {
        self.set_at(channel_id, interval, Utc::now())
    }

    /// [`set`](Self::set) with an explicit clock.
    pub fn set_at(
        &self,
        channel_id: ChannelId,
        interval: PurgeInterval,
        now: DateTime<Utc>,
    ) -> PurgeTask {
        let task = PurgeTask::new(interval, now);
        let mut tasks = self.tasks.write().expect("RwLock poisoned");
        tasks.insert(channel_id, task);
        task
    }

    /// Remove the task for `channel_id`. Returns whether one existed.
    pub fn clear(&self, channel_id: &ChannelId) -> bool {
        let mut tasks = self.tasks.write().expect("RwLock poisoned");
        tasks.remove(channel_id).is_some()
    }

    /// Channels whose `next_due <= now`. Leaves the registry untouched.
    pub fn due_tasks(&self, now: DateTime<Utc>) -> Vec<ChannelId> {
        let tasks = self.tasks.read().expect("RwLock poisoned");
        let mut due: Vec<ChannelId> = tasks
            .iter()
            .filter(|(_, task)| task.is_due(now))
            .map(|(channel_id, _)| channel_id.clone())
            .collect();
        due.sort();
        due
    }

    /// Select every due channel and advance it to `now + interval`, atomically.
    ///
    /// A concurrent `set` either lands before (and is then judged by its own
    /// fresh `next_due`) or after (and replaces the advanced task).
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<ChannelId> {
        let mut tasks = self.tasks.write().expect("RwLock poisoned");
        let mut due = Vec::new();
        for (channel_id, task) in tasks.iter_mut() {
            if task.is_due(now) {
                task.advance(now);
                due.push(channel_id.clone());
            }
        }
        due.sort();
        due
    }

    pub fn get(&self, channel_id: &ChannelId) -> Option<PurgeTask> {
        let tasks = self.tasks.read().expect("RwLock poisoned");
        tasks.get(channel_id).copied()
    }

    /// Number of scheduled channels.
    pub fn count(&self) -> usize {
        let tasks = self.tasks.read().expect("RwLock poisoned");
        tasks.len()
    }

    /// All tasks, ordered by channel id.
    pub fn snapshot(&self) -> Vec<(ChannelId, PurgeTask)> {
        let tasks = self.tasks.read().expect("RwLock poisoned");
        let mut all: Vec<(ChannelId, PurgeTask)> = tasks
            .iter()
            .map(|(channel_id, task)| (channel_id.clone(), *task))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tasks = self.tasks.read().expect("RwLock poisoned");
        f.debug_struct("TaskRegistry")
            .field("task_count", &tasks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use rstest::rstest;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn hours(n: u32) -> PurgeInterval {
        PurgeInterval::from_hours(n).unwrap()
    }

    #[test]
    fn test_interval_must_be_positive() {
        assert!(PurgeInterval::from_hours(0).is_none());
        assert!(PurgeInterval::from_days(0).is_none());
        assert!(PurgeInterval::new(Duration::seconds(-5)).is_none());
        assert_eq!(
            PurgeInterval::from_days(2).unwrap().as_duration(),
            Duration::hours(48)
        );
    }

    #[test]
    fn test_interval_display() {
        assert_eq!(hours(6).to_string(), "6h");
        assert_eq!(PurgeInterval::from_days(3).unwrap().to_string(), "3d");
        assert_eq!(
            PurgeInterval::new(Duration::seconds(90)).unwrap().to_string(),
            "90s"
        );
    }

    #[rstest]
    #[case::hours(PurgeInterval::from_hours(5).unwrap(), Duration::hours(5))]
    #[case::days(PurgeInterval::from_days(7).unwrap(), Duration::days(7))]
    fn test_set_schedules_one_interval_ahead(
        #[case] interval: PurgeInterval,
        #[case] expected: Duration,
    ) {
        let registry = TaskRegistry::new();
        let task = registry.set_at("c".into(), interval, t0());
        assert_eq!(task.next_due, t0() + expected);
        assert_eq!(registry.get(&"c".into()), Some(task));
    }

    #[test]
    fn test_huge_interval_saturates() {
        let registry = TaskRegistry::new();
        let task = registry.set_at("c".into(), PurgeInterval::from_days(u32::MAX).unwrap(), t0());
        assert_eq!(task.next_due, DateTime::<Utc>::MAX_UTC);
        assert!(!task.is_due(t0()));
    }

    #[test]
    fn test_set_replaces_existing_task() {
        let registry = TaskRegistry::new();
        registry.set_at("c".into(), hours(1), t0());
        registry.set_at("c".into(), hours(10), t0() + Duration::minutes(30));

        assert_eq!(registry.count(), 1);
        let task = registry.get(&"c".into()).unwrap();
        assert_eq!(task.interval, hours(10));
        assert_eq!(task.next_due, t0() + Duration::minutes(30) + Duration::hours(10));
    }

    #[rstest]
    #[case::before(Duration::minutes(59), false)]
    #[case::exactly(Duration::hours(1), true)]
    #[case::after(Duration::hours(2), true)]
    fn test_due_tasks_boundary(#[case] elapsed: Duration, #[case] due: bool) {
        let registry = TaskRegistry::new();
        registry.set_at("c".into(), hours(1), t0());

        let result = registry.due_tasks(t0() + elapsed);
        assert_eq!(result.len(), usize::from(due));
        // Read-only: asking twice gives the same answer.
        assert_eq!(registry.due_tasks(t0() + elapsed), result);
    }

    #[test]
    fn test_take_due_advances_only_due_tasks() {
        let registry = TaskRegistry::new();
        registry.set_at("a".into(), hours(1), t0());
        registry.set_at("b".into(), hours(5), t0());

        let now = t0() + Duration::hours(2);
        let due = registry.take_due(now);
        assert_eq!(due, vec![ChannelId::from("a")]);

        assert_eq!(registry.get(&"a".into()).unwrap().next_due, now + Duration::hours(1));
        assert_eq!(registry.get(&"b".into()).unwrap().next_due, t0() + Duration::hours(5));
        assert!(registry.take_due(now).is_empty());
    }

    #[test]
    fn test_advance_never_regresses() {
        let mut task = PurgeTask::new(hours(1), t0());
        let original = task.next_due;
        task.advance(t0() - Duration::hours(3));
        assert_eq!(task.next_due, original);
    }

    #[test]
    fn test_advance_saturates_at_max() {
        let mut task = PurgeTask {
            interval: PurgeInterval::from_days(u32::MAX).unwrap(),
            next_due: t0(),
        };
        task.advance(DateTime::<Utc>::MAX_UTC - Duration::days(1));
        assert_eq!(task.next_due, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_clear() {
        let registry = TaskRegistry::new();
        registry.set_at("c".into(), hours(1), t0());
        assert!(registry.clear(&"c".into()));
        assert!(!registry.clear(&"c".into()));
        assert_eq!(registry.count(), 0);
        assert!(registry.due_tasks(t0() + Duration::days(1)).is_empty());
    }

    #[test]
    fn test_snapshot_is_ordered() {
        let registry = TaskRegistry::new();
        for id in ["c", "a", "b"] {
            registry.set_at(id.into(), hours(1), t0());
        }
        let ids: Vec<String> = registry
            .snapshot()
            .into_iter()
            .map(|(id, _)| id.to_string())
            .collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn test_concurrent_sets_keep_count_consistent() {
        let registry = TaskRegistry::new();
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        // Every worker writes the same 50 channels twice over.
                        let channel = ChannelId::new(format!("chan-{}", i % 50));
                        registry.set_at(channel, hours(worker + 1), t0());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.count(), 50);
    }

    #[test]
    fn test_clones_share_state() {
        let registry = TaskRegistry::new();
        let clone = registry.clone();
        clone.set_at("c".into(), hours(1), t0());
        assert_eq!(registry.count(), 1);
        assert_eq!(format!("{registry:?}"), "TaskRegistry { task_count: 1 }");
    }
}
