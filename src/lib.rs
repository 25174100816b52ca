//! purgebot: scheduled message-retention enforcer for chat channels.
//!
//! Operators give a channel a purge interval; a background scheduler wakes on
//! a fixed tick, finds channels whose purge is due, and wipes their history
//! through the platform's message API, bulk deleting young messages and
//! deleting old ones individually.

pub mod commands;
pub mod config;
pub mod observability;
pub mod purge;
pub mod routes;
pub mod scheduler;
pub mod store;

#[cfg(test)]
mod tests;

use std::{sync::Arc, time::Instant};

use crate::scheduler::{Scheduler, TaskRegistry};

/// Shared state handed to every HTTP handler.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    /// Process start, for the status uptime.
    pub started_at: Instant,
}

impl AppState {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self {
            scheduler,
            started_at: Instant::now(),
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        self.scheduler.registry()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}
