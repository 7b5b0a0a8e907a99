// ABOUTME: The RecordStore contract shared by every backend: append, snapshot queries, and live subscription.
// ABOUTME: Backends differ only in durability; callers hold an Arc<dyn RecordStore> and never see which is used.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

use crate::record::{NewRecord, Record};
use crate::subscription::Subscription;

/// Errors returned by store operations.
///
/// `NoData` is the legitimate "nothing has been ingested yet" answer and is
/// kept apart from backend failures so callers can tell the two apart.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no data yet")]
    NoData,

    #[error("store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }
}

/// An append-only record log with point-in-time and live reads.
///
/// `append` is driven by a single writer (the ingestion task). All read
/// operations may be called concurrently from any number of tasks and never
/// observe a partially written record.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a record, assign its `seq` (and `id`, if the backend issues
    /// them), and publish the new head to subscribers before returning.
    async fn append(&self, record: NewRecord) -> Result<Record, StoreError>;

    /// Up to `limit` records, newest first. `NoData` if the store is empty.
    async fn snapshot(&self, limit: usize) -> Result<Vec<Record>, StoreError>;

    /// The newest record. `NoData` if the store is empty.
    async fn latest(&self) -> Result<Record, StoreError>;

    /// Up to `limit` records with `seq > cursor`, oldest first. Empty when the
    /// cursor is already at the head.
    async fn records_after(&self, cursor: u64, limit: usize) -> Result<Vec<Record>, StoreError>;

    /// Number of records stored.
    async fn len(&self) -> Result<u64, StoreError>;

    /// `seq` of the newest record, 0 when empty.
    fn head(&self) -> u64;

    /// A receiver that observes every head change.
    fn watch_head(&self) -> watch::Receiver<u64>;
}

/// Subscription helpers available on any shared store.
pub trait SubscribeExt {
    /// Join at the current head: only records appended from now on are delivered.
    fn subscribe(&self) -> Subscription;

    /// Join at a caller-chosen cursor: records with `seq > cursor` are delivered.
    fn subscribe_from(&self, cursor: u64) -> Subscription;
}

impl SubscribeExt for Arc<dyn RecordStore> {
    fn subscribe(&self) -> Subscription {
        let rx = self.watch_head();
        let cursor = *rx.borrow();
        Subscription::new(Arc::clone(self), cursor, rx)
    }

    fn subscribe_from(&self, cursor: u64) -> Subscription {
        Subscription::new(Arc::clone(self), cursor, self.watch_head())
    }
}
