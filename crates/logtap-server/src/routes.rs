// ABOUTME: Route definitions for the logtap HTTP API.
// ABOUTME: Assembles snapshot, live feed, and health routes into one traced Axum Router.

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::SharedState;

/// Build the complete Axum router with all routes and shared state.
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/data", get(api::records::snapshot))
        .route("/data/latest", get(api::records::latest))
        .route("/stream", get(api::stream::live_feed))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check handler. Reports the record count and ingestion counters.
async fn health(State(state): State<SharedState>) -> Response {
    let ingest = state.ingest.as_ref().map(|stats| stats.summary());

    match state.store.len().await {
        Ok(records) => Json(json!({
            "status": "ok",
            "records": records,
            "ingest": ingest,
        }))
        .into_response(),
        Err(e) => {
            tracing::error!("health check could not read the store: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "error": e.to_string(),
                    "ingest": ingest,
                })),
            )
                .into_response()
        }
    }
}
