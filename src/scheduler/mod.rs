//! Scheduler loop.
//!
//! A fixed-period timer drives [`Scheduler::tick`]. Each tick:
//!
//! 1. Atomically selects every due task and advances it to `now + interval`
//!    ([`TaskRegistry::take_due`]). Rescheduling happens before the purge
//!    runs, so a slow or failing purge never causes rapid re-triggering; a
//!    failed channel waits for its next full interval.
//! 2. Spawns one purge per due channel on the shared [`TaskTracker`]. No
//!    handle is kept; results are logged by the spawned task.
//!
//! With `prevent_overlap` on, a channel whose previous purge is still in
//! flight is skipped for this tick (it has still been rescheduled).

pub mod registry;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Utc};
pub use registry::{PurgeInterval, PurgeTask, TaskRegistry, TaskView};
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    config::SchedulerConfig,
    purge::{PurgeExecutor, PurgeRunResult},
    store::ChannelId,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("A purge is already running for channel {0}")]
    AlreadyRunning(ChannelId),
}

/// Channels launched and skipped by one tick.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    pub launched: Vec<ChannelId>,
    pub skipped: Vec<ChannelId>,
}

#[derive(Debug, Clone, Copy)]
enum PurgeTrigger {
    Scheduled,
    Manual,
}

impl PurgeTrigger {
    fn as_str(self) -> &'static str {
        match self {
            PurgeTrigger::Scheduled => "scheduled",
            PurgeTrigger::Manual => "manual",
        }
    }
}

type InFlight = Arc<Mutex<HashMap<ChannelId, usize>>>;

/// Marks a channel as having a purge in flight until dropped.
///
/// Dropped at the end of the spawned task, including on panic unwind.
struct InFlightGuard {
    in_flight: InFlight,
    channel_id: ChannelId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(count) = in_flight.get_mut(&self.channel_id) {
            *count -= 1;
            if *count == 0 {
                in_flight.remove(&self.channel_id);
            }
        }
    }
}

pub struct Scheduler {
    registry: TaskRegistry,
    executor: Arc<PurgeExecutor>,
    config: SchedulerConfig,
    tracker: TaskTracker,
    in_flight: InFlight,
}

impl Scheduler {
    pub fn new(
        registry: TaskRegistry,
        executor: Arc<PurgeExecutor>,
        config: SchedulerConfig,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            registry,
            executor,
            config,
            tracker,
            in_flight: Arc::default(),
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Whether a purge for `channel_id` is currently running.
    pub fn is_running(&self, channel_id: &ChannelId) -> bool {
        self.in_flight
            .lock()
            .expect("Mutex poisoned")
            .contains_key(channel_id)
    }

    /// Number of channels with a purge in flight.
    pub fn running_count(&self) -> usize {
        self.in_flight.lock().expect("Mutex poisoned").len()
    }

    /// Claim the in-flight slot for a channel, or `None` if overlap is
    /// prevented and a purge is already running.
    fn begin(&self, channel_id: &ChannelId) -> Option<InFlightGuard> {
        let mut in_flight = self.in_flight.lock().expect("Mutex poisoned");
        let count = in_flight.entry(channel_id.clone()).or_insert(0);
        if self.config.prevent_overlap && *count > 0 {
            return None;
        }
        *count += 1;
        Some(InFlightGuard {
            in_flight: self.in_flight.clone(),
            channel_id: channel_id.clone(),
        })
    }

    /// Run one due-check at `now`. Never waits on the store.
    pub fn tick(&self, now: DateTime<Utc>) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        for channel_id in self.registry.take_due(now) {
            match self.begin(&channel_id) {
                Some(guard) => {
                    self.spawn_purge(channel_id.clone(), guard, PurgeTrigger::Scheduled, None);
                    outcome.launched.push(channel_id);
                }
                None => {
                    tracing::warn!(
                        channel_id = %channel_id,
                        "Previous purge still running, skipping this cycle"
                    );
                    outcome.skipped.push(channel_id);
                }
            }
        }

        if outcome.launched.is_empty() && outcome.skipped.is_empty() {
            tracing::trace!("Scheduler tick, nothing due");
        } else {
            tracing::info!(
                launched = outcome.launched.len(),
                skipped = outcome.skipped.len(),
                scheduled = self.registry.count(),
                "Scheduler tick"
            );
        }

        outcome
    }

    /// Purge `channel_id` now, outside its schedule. Leaves `next_due` alone.
    ///
    /// With a `limit`, only that many of the newest messages are deleted.
    pub fn trigger(&self, channel_id: ChannelId, limit: Option<usize>) -> Result<(), SchedulerError> {
        let guard = self
            .begin(&channel_id)
            .ok_or_else(|| SchedulerError::AlreadyRunning(channel_id.clone()))?;
        self.spawn_purge(channel_id, guard, PurgeTrigger::Manual, limit);
        Ok(())
    }

    fn spawn_purge(
        &self,
        channel_id: ChannelId,
        guard: InFlightGuard,
        trigger: PurgeTrigger,
        limit: Option<usize>,
    ) {
        let executor = self.executor.clone();
        self.tracker.spawn(async move {
            let _guard = guard;
            tracing::debug!(channel_id = %channel_id, trigger = trigger.as_str(), limit = ?limit, "Purge started");
            let result = executor.run_limited(&channel_id, limit).await;
            log_result(&channel_id, trigger, &result);
        });
    }

    /// Drive [`tick`](Self::tick) on the configured period until `shutdown` fires.
    ///
    /// Purges already in flight keep running; wait on the tracker to drain them.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(
            tick_secs = self.config.tick_secs,
            prevent_overlap = self.config.prevent_overlap,
            dry_run = self.executor.config().dry_run,
            "Starting purge scheduler"
        );

        let mut ticker = tokio::time::interval(self.config.tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!(
                        running = self.running_count(),
                        "Purge scheduler stopping"
                    );
                    break;
                }
                _ = ticker.tick() => {
                    self.tick(Utc::now());
                }
            }
        }
    }
}

fn log_result(channel_id: &ChannelId, trigger: PurgeTrigger, result: &PurgeRunResult) {
    let dry_run_msg = if result.dry_run { " (DRY RUN)" } else { "" };

    if result.has_failures() {
        tracing::warn!(
            channel_id = %channel_id,
            trigger = trigger.as_str(),
            found = result.messages_found,
            deleted = result.total_deleted(),
            failed = result.failed_deletes,
            history_complete = result.history_complete,
            duration_ms = result.duration_ms,
            "Purge finished with errors{}",
            dry_run_msg
        );
    } else {
        tracing::info!(
            channel_id = %channel_id,
            trigger = trigger.as_str(),
            found = result.messages_found,
            pages = result.pages_fetched,
            bulk_requests = result.bulk_requests,
            bulk_deleted = result.bulk_deleted,
            single_deleted = result.single_deleted,
            duration_ms = result.duration_ms,
            "Purge complete{}",
            dry_run_msg
        );
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("running", &self.running_count())
            .finish()
    }
}
