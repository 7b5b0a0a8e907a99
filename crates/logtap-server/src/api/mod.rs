// ABOUTME: API module containing the HTTP handlers for logtap.
// ABOUTME: Snapshot queries live in records, the SSE live feed in stream; store errors map to JSON here.

pub mod records;
pub mod stream;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use logtap_core::StoreError;
use serde_json::json;

/// Map a store error onto the HTTP contract: empty store is 404, anything
/// else is 500.
pub(crate) fn store_error_response(err: StoreError) -> Response {
    match err {
        StoreError::NoData => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "no data yet" })),
        )
            .into_response(),
        StoreError::Backend(e) => {
            tracing::error!("record query failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": format!("record query failed: {}", e) })),
            )
                .into_response()
        }
    }
}
