// ABOUTME: In-process append-only RecordStore backed by a Vec behind a tokio RwLock.
// ABOUTME: Fast and volatile; records are lost on restart. Also the read side of the JSONL store.

use async_trait::async_trait;
use tokio::sync::{RwLock, watch};

use crate::record::{NewRecord, Record};
use crate::store::{RecordStore, StoreError};

/// Records live in insertion order; `seq` is the 1-based index.
pub struct MemoryStore {
    records: RwLock<Vec<Record>>,
    head_tx: watch::Sender<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_records(Vec::new())
    }

    /// Seed the store with records recovered from elsewhere. They must carry
    /// consecutive `seq` values starting at 1.
    pub fn with_records(records: Vec<Record>) -> Self {
        let head = records.last().map_or(0, |r| r.seq);
        let (head_tx, _) = watch::channel(head);
        Self {
            records: RwLock::new(records),
            head_tx,
        }
    }

    /// Append a record whose `id` was assigned by the caller.
    pub async fn append_with_id(&self, record: NewRecord, id: Option<String>) -> Record {
        let record = {
            let mut records = self.records.write().await;
            let record = record.into_record(records.len() as u64 + 1, id);
            records.push(record.clone());
            record
        };
        self.head_tx.send_replace(record.seq);
        record
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn append(&self, record: NewRecord) -> Result<Record, StoreError> {
        Ok(self.append_with_id(record, None).await)
    }

    async fn snapshot(&self, limit: usize) -> Result<Vec<Record>, StoreError> {
        let records = self.records.read().await;
        if records.is_empty() {
            return Err(StoreError::NoData);
        }
        Ok(records.iter().rev().take(limit).cloned().collect())
    }

    async fn latest(&self) -> Result<Record, StoreError> {
        let records = self.records.read().await;
        records.last().cloned().ok_or(StoreError::NoData)
    }

    async fn records_after(&self, cursor: u64, limit: usize) -> Result<Vec<Record>, StoreError> {
        let records = self.records.read().await;
        let start = usize::try_from(cursor).unwrap_or(usize::MAX).min(records.len());
        Ok(records[start..].iter().take(limit).cloned().collect())
    }

    async fn len(&self) -> Result<u64, StoreError> {
        Ok(self.records.read().await.len() as u64)
    }

    fn head(&self) -> u64 {
        *self.head_tx.borrow()
    }

    fn watch_head(&self) -> watch::Receiver<u64> {
        self.head_tx.subscribe()
    }
}
