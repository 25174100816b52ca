//! Process status and schedule listing.

use axum::{Json, extract::State};
use serde::Serialize;

use crate::{AppState, commands, scheduler::TaskView};

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Rounded to the nearest second.
    pub uptime_secs: u64,
    pub task_count: usize,
    /// Channels with a purge in flight.
    pub running: usize,
    /// Human-readable rendering of the above.
    pub message: String,
}

#[tracing::instrument(name = "status.get", skip(state))]
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let report = commands::status(state.started_at, state.registry());
    Json(StatusResponse {
        uptime_secs: report.uptime_secs(),
        task_count: report.task_count,
        running: state.scheduler.running_count(),
        message: report.to_string(),
    })
}

/// Every scheduled channel, ordered by channel id.
#[tracing::instrument(name = "purge_tasks.list", skip(state))]
pub async fn list_tasks(State(state): State<AppState>) -> Json<Vec<TaskView>> {
    let tasks = state
        .registry()
        .snapshot()
        .into_iter()
        .map(|(channel_id, task)| TaskView::new(channel_id, &task))
        .collect();
    Json(tasks)
}
