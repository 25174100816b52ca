//! Per-channel commands: purge interval and manual purge.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_valid::Valid;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::ApiError;
use crate::{AppState, commands, scheduler::TaskView, store::ChannelId};

/// Longest channel id accepted on the path.
const MAX_CHANNEL_ID_LEN: usize = 64;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SetPurgeIntervalRequest {
    /// Number of `unit`s between purges.
    #[validate(range(min = 1, max = 4294967295_i64))]
    pub interval: i64,
    /// `hours` or `days`, case-insensitive.
    pub unit: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct PurgeNowParams {
    /// Newest messages to delete. Absent means the whole history.
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub message: String,
    pub removed: bool,
}

fn channel_id(raw: String) -> Result<ChannelId, ApiError> {
    if raw.trim().is_empty() || raw.len() > MAX_CHANNEL_ID_LEN {
        return Err(ApiError::BadRequest(format!(
            "channel_id must be between 1 and {MAX_CHANNEL_ID_LEN} characters"
        )));
    }
    Ok(ChannelId::new(raw))
}

/// Set or replace the purge interval of a channel.
///
/// An unrecognised unit is ignored: 204 with no body and no change.
#[tracing::instrument(name = "channels.set_purge_interval", skip(state, input))]
pub async fn set_purge_interval(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    Valid(Json(input)): Valid<Json<SetPurgeIntervalRequest>>,
) -> Result<Response, ApiError> {
    let channel_id = channel_id(channel)?;
    let amount = u32::try_from(input.interval)
        .map_err(|_| ApiError::BadRequest("interval is out of range".into()))?;

    let response = match commands::set_purge_interval(
        state.registry(),
        channel_id,
        amount,
        &input.unit,
    ) {
        Some(message) => (StatusCode::OK, Json(MessageResponse { message })).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    };
    Ok(response)
}

#[tracing::instrument(name = "channels.get_purge_interval", skip(state))]
pub async fn get_purge_interval(
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> Result<Json<TaskView>, ApiError> {
    let channel_id = channel_id(channel)?;
    let task = state.registry().get(&channel_id).ok_or_else(|| {
        ApiError::NotFound(format!("No purge interval is set for channel {channel_id}"))
    })?;
    Ok(Json(TaskView::new(channel_id, &task)))
}

#[tracing::instrument(name = "channels.clear_purge_interval", skip(state))]
pub async fn clear_purge_interval(
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> Result<Json<ClearResponse>, ApiError> {
    let channel_id = channel_id(channel)?;
    let reply = commands::clear_purge_interval(state.registry(), &channel_id);
    Ok(Json(ClearResponse {
        message: reply.to_string(),
        removed: reply.removed,
    }))
}

/// Purge a channel right away. Its schedule, if any, is left alone.
///
/// `?limit=N` deletes only the `N` newest messages instead of the whole history.
#[tracing::instrument(name = "channels.purge_now", skip(state))]
pub async fn purge_now(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    Valid(Query(params)): Valid<Query<PurgeNowParams>>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let channel_id = channel_id(channel)?;
    let limit = params.limit.map(|n| n as usize);
    state.scheduler.trigger(channel_id.clone(), limit)?;

    let message = match limit {
        Some(n) => format!("Cleaning up to {n} messages in channel {channel_id}."),
        None => format!("Purge started for channel {channel_id}."),
    };
    Ok((StatusCode::ACCEPTED, Json(MessageResponse { message })))
}
