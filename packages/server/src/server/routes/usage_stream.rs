//! Usage notification stream.
//!
//! GET /usage/stream?user_id=ID
//!
//! Registers the caller as the user's live channel and forwards every
//! published message as a `data:` frame. A newer connection for the same
//! user replaces this one and ends its stream.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use tracing::info;

use crate::common::UserId;
use crate::server::app::AxumAppState;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
pub struct UsageStreamQuery {
    user_id: Option<String>,
}

pub async fn usage_stream_handler(
    Extension(state): Extension<AxumAppState>,
    Query(query): Query<UsageStreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, &'static str)> {
    let user_id = query
        .user_id
        .as_deref()
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .map(UserId::new)
        .filter(|id| id.is_valid())
        .ok_or((StatusCode::BAD_REQUEST, "user_id is required and must be positive"))?;

    let channel = state.deps.user_channels.register(user_id);
    info!(user_id = %user_id, generation = channel.generation(), "Usage stream connected");

    let events = channel.map(|message| Ok(Event::default().data(message)));

    Ok(Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    ))
}
