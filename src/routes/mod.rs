//! HTTP surface for the command interface.
//!
//! | Method & path                                    | Handler                          |
//! |--------------------------------------------------|----------------------------------|
//! | `PUT /v1/channels/{channel_id}/purge-interval`   | [`channels::set_purge_interval`]   |
//! | `GET /v1/channels/{channel_id}/purge-interval`   | [`channels::get_purge_interval`]   |
//! | `DELETE /v1/channels/{channel_id}/purge-interval`| [`channels::clear_purge_interval`] |
//! | `POST /v1/channels/{channel_id}/purge`           | [`channels::purge_now`]            |
//! | `GET /v1/purge-tasks`                            | [`status::list_tasks`]             |
//! | `GET /v1/status`                                 | [`status::status`]                 |
//! | `GET /health`                                    | [`health::health_check`]           |

pub mod channels;
mod error;
pub mod health;
pub mod status;

use axum::{
    Router,
    routing::{get, post, put},
};
pub use error::{ApiError, ErrorResponse};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn router(state: AppState) -> Router {
    let v1 = Router::new()
        .route(
            "/channels/{channel_id}/purge-interval",
            put(channels::set_purge_interval)
                .get(channels::get_purge_interval)
                .delete(channels::clear_purge_interval),
        )
        .route("/channels/{channel_id}/purge", post(channels::purge_now))
        .route("/purge-tasks", get(status::list_tasks))
        .route("/status", get(status::status));

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/v1", v1)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
