// ABOUTME: Snapshot query handlers: the most recent records, newest first, and the single latest record.
// ABOUTME: Each request reads the store once; repeated queries without appends return the same result.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use logtap_core::Record;
use serde::Deserialize;

use super::store_error_response;
use crate::app_state::SharedState;

/// Query parameters for `GET /data`.
#[derive(Debug, Deserialize)]
pub struct SnapshotQuery {
    pub limit: Option<usize>,
}

/// GET /data?limit=N - The N most recent records, newest first.
pub async fn snapshot(
    State(state): State<SharedState>,
    Query(query): Query<SnapshotQuery>,
) -> Response {
    if query.limit == Some(0) {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "limit must be at least 1" })),
        )
            .into_response();
    }

    let limit = state.limits.resolve(query.limit);
    match state.store.snapshot(limit).await {
        Ok(records) => Json(records.iter().map(Record::to_json).collect::<Vec<_>>()).into_response(),
        Err(e) => store_error_response(e),
    }
}

/// GET /data/latest - The single most recent record.
pub async fn latest(State(state): State<SharedState>) -> Response {
    match state.store.latest().await {
        Ok(record) => Json(record.to_json()).into_response(),
        Err(e) => store_error_response(e),
    }
}
