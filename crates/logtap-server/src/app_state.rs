// ABOUTME: Shared application state for the logtap HTTP server.
// ABOUTME: Holds the RecordStore handle, snapshot limits, and the ingestion counters for /health.

use std::sync::Arc;

use logtap_core::{IngestStats, RecordStore};

/// Bounds applied to `GET /data?limit=N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            default_limit: 100,
            max_limit: 1000,
        }
    }
}

impl QueryLimits {
    /// Resolve a requested limit. `None` means the default; anything above
    /// the maximum is clamped to it.
    pub fn resolve(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .min(self.max_limit)
    }
}

/// Shared application state accessible by all Axum handlers.
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub limits: QueryLimits,
    /// Counters of the ingestion task feeding `store`, when one is running.
    pub ingest: Option<Arc<IngestStats>>,
}

/// Type alias for the Arc-wrapped state used with Axum's State extractor.
pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            limits: QueryLimits::default(),
            ingest: None,
        }
    }

    pub fn with_limits(mut self, limits: QueryLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_ingest_stats(mut self, stats: Arc<IngestStats>) -> Self {
        self.ingest = Some(stats);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_default_and_clamp() {
        let limits = QueryLimits {
            default_limit: 20,
            max_limit: 50,
        };
        assert_eq!(limits.resolve(None), 20);
        assert_eq!(limits.resolve(Some(5)), 5);
        assert_eq!(limits.resolve(Some(5000)), 50);
    }
}
