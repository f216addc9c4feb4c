//! SSE endpoints: per-turn message streams and long-lived subscriptions.
//!
//! Both endpoints frame events as `data: <json>\n\n`, with the `[DONE]`
//! sentinel closing each turn and `: heartbeat` comments keeping
//! intermediaries from dropping idle connections.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::{self, Stream};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::session::events::{SessionEvent, Subscriber};
use crate::state::AppState;

use super::{internal, ApiError, ErrorResponse};

const DONE_SENTINEL: &str = "[DONE]";
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// Per-subscriber queue depth. A reader further behind than this starts
/// losing events rather than stalling the session.
const SUBSCRIBER_QUEUE: usize = 256;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct SendMessageRequest {
    pub content: String,
}

fn frame(event: &SessionEvent) -> Event {
    match event {
        SessionEvent::Done => Event::default().data(DONE_SENTINEL),
        other => Event::default()
            .data(serde_json::to_string(other).unwrap_or_else(|_| "{}".to_string())),
    }
}

fn keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(HEARTBEAT_INTERVAL)
        .text("heartbeat")
}

/// Post a message
///
/// Starts a turn and streams its events; the response ends with the
/// turn's `[DONE]` sentinel.
#[utoipa::path(
    post,
    path = "/api/chats/{id}/messages",
    tag = "Chats",
    params(("id" = String, Path, description = "Chat ID")),
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "SSE stream of turn events", content_type = "text/event-stream"),
        (status = 500, description = "Session could not start", body = ErrorResponse)
    )
)]
pub async fn chat_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let handle = state
        .registry
        .get_or_start(&id)
        .await
        .map_err(|e| internal(format!("Failed to start session: {e}")))?;

    let (tx, rx) = mpsc::channel::<SessionEvent>(SUBSCRIBER_QUEUE);
    handle.send_message(req.content, Some(Subscriber::new(tx))).await;

    // One turn only: close after the first Done (or if the session dies).
    let events = stream::unfold(Some(rx), |rx| async move {
        let mut rx = rx?;
        match rx.recv().await {
            None | Some(SessionEvent::Done) => {
                Some((Ok::<_, Infallible>(Event::default().data(DONE_SENTINEL)), None))
            }
            Some(event) => Some((Ok(frame(&event)), Some(rx))),
        }
    });

    Ok(Sse::new(events).keep_alive(keep_alive()))
}

/// Subscribe to a chat
///
/// Long-lived stream: a `connected` frame, then buffered replay of any
/// in-progress turn, then live events for every subsequent turn until the
/// client disconnects.
#[utoipa::path(
    get,
    path = "/api/chats/{id}/subscribe",
    tag = "Chats",
    params(("id" = String, Path, description = "Chat ID")),
    responses(
        (status = 200, description = "SSE stream of session events", content_type = "text/event-stream"),
        (status = 500, description = "Session could not start", body = ErrorResponse)
    )
)]
pub async fn chat_subscribe(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let handle = state
        .registry
        .get_or_start(&id)
        .await
        .map_err(|e| internal(format!("Failed to start session: {e}")))?;

    let (tx, rx) = mpsc::channel::<SessionEvent>(SUBSCRIBER_QUEUE);
    // subscribe() returns only after any replay is queued, so the replay
    // always precedes live events in the channel.
    handle.subscribe(Subscriber::new(tx)).await;

    let connected =
        stream::once(async { Ok::<_, Infallible>(frame(&SessionEvent::Connected)) });
    let events = ReceiverStream::new(rx).map(|event| Ok(frame(&event)));

    Ok(Sse::new(connected.chain(events)).keep_alive(keep_alive()))
}
