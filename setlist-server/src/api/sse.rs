//! Server-Sent Events for performance sessions
//!
//! A subscriber first receives a `Snapshot` of the setlist's active session,
//! so a reconnecting follower resynchronises without a separate fetch, then
//! every hub event for that setlist.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Extension, Router,
};
use futures::stream::{self, Stream, StreamExt};
use setlist_common::events::SessionEvent;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};
use uuid::Uuid;

use super::auth::CurrentUser;
use super::error::ApiResult;
use crate::db::{performance, setlists};
use crate::AppState;

fn to_sse(event: &SessionEvent) -> Option<Result<Event, Infallible>> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Ok(Event::default().event(event.event_type()).data(json))),
        Err(e) => {
            warn!("Failed to serialize event: {}", e);
            None
        }
    }
}

/// GET /api/setlists/:id/session/events
pub async fn session_events(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(setlist_id): Path<Uuid>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    setlists::get_visible_setlist(&state.db, &user, setlist_id).await?;

    // Subscribe before reading the snapshot so nothing falls in between
    let rx = state.hub.subscribe(setlist_id).await;
    let session = performance::get_active_session(&state.db, setlist_id, state.db_max_lock_wait_ms).await?;
    debug!(setlist_id = %setlist_id, user_id = %user.id, "SSE client connected");

    let snapshot = stream::iter(to_sse(&SessionEvent::Snapshot { session }));
    let updates = BroadcastStream::new(rx).filter_map(move |result| async move {
        match result {
            Ok(event) => to_sse(&event),
            Err(e) => {
                // Lagged: the client resyncs from the next snapshot it asks for
                warn!(setlist_id = %setlist_id, "SSE stream error: {:?}", e);
                None
            }
        }
    });

    Ok(Sse::new(snapshot.chain(updates)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

pub fn sse_routes() -> Router<AppState> {
    Router::new().route("/api/setlists/:id/session/events", get(session_events))
}
