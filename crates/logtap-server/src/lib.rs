// ABOUTME: HTTP server for logtap, exposing stored records as snapshots and a live SSE feed.
// ABOUTME: Uses Axum with a shared RecordStore handle; configuration comes from LOGTAP_* variables.

pub mod api;
pub mod app_state;
pub mod backend;
pub mod config;
pub mod routes;

pub use app_state::{AppState, QueryLimits, SharedState};
pub use backend::{OpenStoreError, open_store};
pub use config::{ConfigError, LogtapConfig, StoreKind};
pub use routes::create_router;
