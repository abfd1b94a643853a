//! Realtime stream endpoint and the publish hook used by mutating handlers.

use std::sync::Arc;

use api_types::realtime::{Event, EventKind};
use axum::{
    extract::{Path, State},
    http::header,
    response::{
        IntoResponse,
        sse::{Event as SseEvent, Sse},
    },
};
use futures::StreamExt;
use realtime::{ChannelSink, Session};
use serde::Serialize;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::{ServerError, server::ServerState};

/// Open an event stream for `group_id`.
///
/// The stream starts with `connected`, replays the group backlog and then
/// carries live events and heartbeats. The session lives inside the stream,
/// so a client disconnect drops it and detaches the sink.
pub async fn subscribe(
    State(state): State<ServerState>,
    Path(group_id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let group_id = group_id.trim();
    if group_id.is_empty() {
        return Err(ServerError::Generic("group id is required".to_string()));
    }

    let (sink, rx) = ChannelSink::channel(state.realtime.sink_capacity());
    let session = Session::start(
        Arc::clone(&state.registry),
        group_id,
        Arc::new(sink),
        state.realtime.heartbeat_interval(),
        &state.shutdown,
    )
    .map_err(|err| ServerError::Unavailable(format!("cannot open realtime stream: {err}")))?;

    let closed = session.closed();
    let stream = ReceiverStream::new(rx)
        .take_until(closed)
        .map(move |event| {
            tracing::trace!(
                session = %session.id(),
                kind = event.kind.as_str(),
                "streaming event"
            );
            SseEvent::default().json_data(&*event)
        });

    Ok(([(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")], Sse::new(stream)))
}

/// Publish `payload` to everyone listening on `group_id`.
///
/// Runs after the change is stored; an encoding failure is logged and the
/// event skipped.
pub(crate) fn notify<T: Serialize>(
    state: &ServerState,
    group_id: Uuid,
    kind: EventKind,
    payload: &T,
) {
    let data = match serde_json::to_value(payload) {
        Ok(data) => data,
        Err(err) => {
            tracing::error!(%group_id, kind = kind.as_str(), "cannot encode event: {err}");
            return;
        }
    };

    let group_id = group_id.to_string();
    state
        .registry
        .publish(&group_id, Event::new(kind, group_id.as_str(), Some(data)));
}
