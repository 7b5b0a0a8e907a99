// ABOUTME: Builds the configured RecordStore backend for the server and ingestion task.
// ABOUTME: Durable backends keep their files under LOGTAP_DATA_DIR.

use std::sync::Arc;

use logtap_core::{MemoryStore, RecordStore};
use logtap_store::{JsonlError, JsonlStore, SqliteError, SqliteStore};
use thiserror::Error;

use crate::config::{LogtapConfig, StoreKind};

pub const JSONL_FILE: &str = "records.jsonl";
pub const SQLITE_FILE: &str = "records.db";

#[derive(Debug, Error)]
pub enum OpenStoreError {
    #[error("failed to open jsonl store: {0}")]
    Jsonl(#[from] JsonlError),

    #[error("failed to open sqlite store: {0}")]
    Sqlite(#[from] SqliteError),
}

/// Open the store selected by `config.store`.
pub async fn open_store(config: &LogtapConfig) -> Result<Arc<dyn RecordStore>, OpenStoreError> {
    let store: Arc<dyn RecordStore> = match config.store {
        StoreKind::Memory => Arc::new(MemoryStore::new()),
        StoreKind::Jsonl => Arc::new(JsonlStore::open(&config.data_dir.join(JSONL_FILE)).await?),
        StoreKind::Sqlite => Arc::new(SqliteStore::open(&config.data_dir.join(SQLITE_FILE))?),
    };
    tracing::info!(kind = ?config.store, head = store.head(), "record store ready");
    Ok(store)
}
