//! Command interface: the operations operators invoke on a channel.
//!
//! These functions hold the command semantics and the reply texts. The
//! transport (HTTP routes, a chat gateway) only parses arguments and renders
//! the returned text.

use std::{fmt, str::FromStr, time::Duration};

use thiserror::Error;

use crate::{
    scheduler::{PurgeInterval, TaskRegistry},
    store::ChannelId,
};

/// Unit accepted by the set-interval command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalUnit {
    Hours,
    Days,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown interval unit: {0}")]
pub struct UnknownUnit(pub String);

impl IntervalUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            IntervalUnit::Hours => "hours",
            IntervalUnit::Days => "days",
        }
    }

    /// `amount` of this unit, or `None` when it is zero.
    pub fn interval(self, amount: u32) -> Option<PurgeInterval> {
        match self {
            IntervalUnit::Hours => PurgeInterval::from_hours(amount),
            IntervalUnit::Days => PurgeInterval::from_days(amount),
        }
    }
}

impl FromStr for IntervalUnit {
    type Err = UnknownUnit;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hours" => Ok(IntervalUnit::Hours),
            "days" => Ok(IntervalUnit::Days),
            _ => Err(UnknownUnit(s.to_string())),
        }
    }
}

impl fmt::Display for IntervalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schedule `channel_id` to be purged every `amount` `unit`.
///
/// Returns the confirmation text, or `None` when the unit is unknown or the
/// amount is zero. Those are dropped without a reply.
pub fn set_purge_interval(
    registry: &TaskRegistry,
    channel_id: ChannelId,
    amount: u32,
    unit: &str,
) -> Option<String> {
    let unit = match unit.parse::<IntervalUnit>() {
        Ok(unit) => unit,
        Err(e) => {
            tracing::debug!(channel_id = %channel_id, error = %e, "Ignoring set-interval command");
            return None;
        }
    };
    let Some(interval) = unit.interval(amount) else {
        tracing::debug!(channel_id = %channel_id, amount, "Ignoring non-positive interval");
        return None;
    };

    let task = registry.set(channel_id.clone(), interval);
    tracing::info!(
        channel_id = %channel_id,
        interval = %interval,
        next_due = %task.next_due,
        "Purge interval set"
    );

    Some(format!(
        "Purge interval for this channel set to {amount} {unit}."
    ))
}

/// Outcome of the clear command. `Display` renders the reply text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearReply {
    /// Whether this call removed a schedule.
    pub removed: bool,
}

impl fmt::Display for ClearReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.removed {
            f.write_str("Purge interval for this channel cleared.")
        } else {
            f.write_str("No purge interval is set for this channel.")
        }
    }
}

/// Stop purging `channel_id`.
pub fn clear_purge_interval(registry: &TaskRegistry, channel_id: &ChannelId) -> ClearReply {
    let removed = registry.clear(channel_id);
    if removed {
        tracing::info!(channel_id = %channel_id, "Purge interval cleared");
    }
    ClearReply { removed }
}

/// Process uptime and schedule count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusReport {
    pub uptime: Duration,
    pub task_count: usize,
}

impl StatusReport {
    /// Uptime rounded to the nearest second.
    pub fn uptime_secs(&self) -> u64 {
        (self.uptime + Duration::from_millis(500)).as_secs()
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.uptime_secs();
        let days = secs / 86_400;
        let hours = (secs % 86_400) / 3_600;
        let minutes = (secs % 3_600) / 60;
        let seconds = secs % 60;
        write!(
            f,
            "Uptime: {days} days, {hours} hours, {minutes} minutes, {seconds} seconds\n\
             Scheduled purge tasks: {}",
            self.task_count
        )
    }
}

pub fn status(started_at: std::time::Instant, registry: &TaskRegistry) -> StatusReport {
    StatusReport {
        uptime: started_at.elapsed(),
        task_count: registry.count(),
    }
}
