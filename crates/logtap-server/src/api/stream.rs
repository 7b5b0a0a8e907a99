// ABOUTME: SSE live feed handler delivering each newly stored record exactly once per subscriber.
// ABOUTME: Every connection owns a store Subscription; Last-Event-ID resumes from a previous cursor.

use std::convert::Infallible;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use logtap_core::{Record, SubscribeExt, Subscription};

use crate::app_state::SharedState;

/// SSE event name carried by every record message.
pub const RECORD_EVENT: &str = "record";

/// Render one record as an SSE message whose id is its `seq`.
fn record_event(record: &Record) -> SseEvent {
    SseEvent::default()
        .event(RECORD_EVENT)
        .id(record.seq.to_string())
        .data(record.to_json().to_string())
}

/// Convert a subscription into an SSE-compatible stream. A store failure is
/// logged and ends the feed; the client may reconnect with Last-Event-ID.
fn event_stream_from_subscription(
    subscription: Subscription,
) -> impl Stream<Item = Result<SseEvent, Infallible>> {
    subscription.into_stream().filter_map(|result| async move {
        match result {
            Ok(record) => Some(Ok(record_event(&record))),
            Err(e) => {
                tracing::error!("live feed stopped on store error: {}", e);
                None
            }
        }
    })
}

/// Parse a `Last-Event-ID` header into a cursor. Anything that is not a
/// record seq is ignored.
fn resume_cursor(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("last-event-id")?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// GET /stream - SSE endpoint delivering records as they are stored.
pub async fn live_feed(State(state): State<SharedState>, headers: HeaderMap) -> impl IntoResponse {
    let subscription = match resume_cursor(&headers) {
        // A cursor past the head would silently skip the next records.
        Some(cursor) => state.store.subscribe_from(cursor.min(state.store.head())),
        None => state.store.subscribe(),
    };
    tracing::debug!(cursor = subscription.cursor(), "live feed subscriber joined");

    Sse::new(event_stream_from_subscription(subscription)).keep_alive(KeepAlive::default())
}
