//! Download progress stream.
//!
//! One request starts one session and streams its events as server-sent
//! events until the terminal event, then closes.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{self, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use audiograb_core::{Privilege, SessionEvent, SessionHandle};

use super::middleware::Caller;
use crate::metrics::{PROGRESS_EVENTS_SENT, PROGRESS_STREAMS_ACTIVE};
use crate::state::AppState;

/// Keep-alive comment interval for idle streams.
const KEEP_ALIVE_SECS: u64 = 15;

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    #[serde(default)]
    pub spotify_link: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DownloadErrorResponse {
    pub status: String,
    pub output: String,
}

impl DownloadErrorResponse {
    fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            output: message.into(),
        }
    }
}

/// GET /download?spotify_link=<link>
pub async fn start_download(
    State(state): State<Arc<AppState>>,
    Caller(privilege): Caller,
    Query(query): Query<DownloadQuery>,
) -> Response {
    let link = query.spotify_link.unwrap_or_default();

    match state.engine().begin(&link, privilege).await {
        Ok(handle) => {
            info!(session_id = %handle.session_id, ?privilege, "Download stream opened");
            Sse::new(event_stream(handle, privilege))
                .keep_alive(
                    sse::KeepAlive::new().interval(Duration::from_secs(KEEP_ALIVE_SECS)),
                )
                .into_response()
        }
        Err(e) if e.is_client_error() => (
            StatusCode::BAD_REQUEST,
            Json(DownloadErrorResponse::new(e.to_string())),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to start download: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(DownloadErrorResponse::new(e.to_string())),
            )
                .into_response()
        }
    }
}

/// Turn a session's events into SSE frames.
fn event_stream(
    handle: SessionHandle,
    privilege: Privilege,
) -> impl Stream<Item = Result<sse::Event, Infallible>> + Send {
    stream::unfold(
        (handle.events, StreamGuard::open()),
        move |(mut events, guard)| async move {
            let event = events.recv().await?;
            let frames = stream::iter(frames(&event, privilege).into_iter().map(Ok));
            Some((frames, (events, guard)))
        },
    )
    .flatten()
}

/// SSE frames for one session event.
///
/// Admin completion is followed by a named `complete` event so the page
/// knows nothing else is coming.
pub fn frames(event: &SessionEvent, privilege: Privilege) -> Vec<sse::Event> {
    PROGRESS_EVENTS_SENT
        .with_label_values(&[event_kind(event)])
        .inc();

    let mut frames = vec![sse::Event::default().data(event.message())];
    if privilege.is_admin() && matches!(event, SessionEvent::Completed) {
        frames.push(sse::Event::default().event("complete").data("done"));
    }
    frames
}

fn event_kind(event: &SessionEvent) -> &'static str {
    match event {
        SessionEvent::Progress(_) => "progress",
        SessionEvent::Delivery(_) => "delivery",
        SessionEvent::Completed => "complete",
        _ => "error",
    }
}

/// Tracks open streams; dropped when the client goes away or the stream ends.
struct StreamGuard;

impl StreamGuard {
    fn open() -> Self {
        PROGRESS_STREAMS_ACTIVE.inc();
        Self
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        PROGRESS_STREAMS_ACTIVE.dec();
    }
}
