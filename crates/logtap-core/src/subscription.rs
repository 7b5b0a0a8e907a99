// ABOUTME: Per-subscriber live feed over a RecordStore, tracking its own cursor.
// ABOUTME: Wakes on head changes and pulls records past the cursor, so a slow reader never holds up the writer.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::Stream;
use tokio::sync::watch;

use crate::record::Record;
use crate::store::{RecordStore, StoreError};

/// Default number of records pulled from the store per wake-up.
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// A live feed of records appended after the subscriber's cursor.
///
/// Each subscription owns its cursor; nothing is shared between subscribers
/// except the store itself. Dropping the subscription releases everything it
/// holds.
pub struct Subscription {
    store: Arc<dyn RecordStore>,
    cursor: u64,
    head_rx: watch::Receiver<u64>,
    batch_size: usize,
}

impl Subscription {
    pub(crate) fn new(store: Arc<dyn RecordStore>, cursor: u64, head_rx: watch::Receiver<u64>) -> Self {
        Self {
            store,
            cursor,
            head_rx,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// `seq` of the last record handed out (or the join point, before any).
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Wait until at least one record past the cursor exists and return the
    /// next batch in append order. Returns `None` once the store's head
    /// publisher is gone and everything before it has been delivered.
    pub async fn next_batch(&mut self) -> Option<Result<Vec<Record>, StoreError>> {
        loop {
            let head = *self.head_rx.borrow_and_update();
            if head > self.cursor {
                match self.store.records_after(self.cursor, self.batch_size).await {
                    Ok(records) => {
                        if let Some(last) = records.last() {
                            self.cursor = last.seq;
                            return Some(Ok(records));
                        }
                    }
                    Err(e) => return Some(Err(e)),
                }
            }

            if self.head_rx.changed().await.is_err() {
                return None;
            }
        }
    }

    /// Flatten the feed into a stream of individual records. The stream ends
    /// after yielding the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Record, StoreError>> + Send {
        futures::stream::unfold(
            (Some(self), VecDeque::new()),
            |(sub, mut pending): (Option<Subscription>, VecDeque<Record>)| async move {
                if let Some(record) = pending.pop_front() {
                    return Some((Ok(record), (sub, pending)));
                }

                let mut sub = sub?;
                match sub.next_batch().await? {
                    Ok(batch) => {
                        pending.extend(batch);
                        let record = pending.pop_front()?;
                        Some((Ok(record), (Some(sub), pending)))
                    }
                    Err(e) => Some((Err(e), (None, pending))),
                }
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::record::NewRecord;
    use crate::store::SubscribeExt;
    use futures::StreamExt;
    use serde_json::json;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    fn record(n: i64) -> NewRecord {
        let serde_json::Value::Object(payload) = json!({ "n": n }) else {
            unreachable!()
        };
        NewRecord::new(payload)
    }

    fn n_of(record: &Record) -> i64 {
        record.payload["n"].as_i64().unwrap()
    }

    async fn collect_n(
        stream: impl Stream<Item = Result<Record, StoreError>>,
        n: usize,
    ) -> Vec<i64> {
        stream.take(n).map(|r| n_of(&r.unwrap())).collect().await
    }

    #[tokio::test]
    async fn joining_late_skips_existing_records() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        for n in 1..=3 {
            store.append(record(n)).await.unwrap();
        }

        let mut sub = store.subscribe();
        assert_eq!(sub.cursor(), 3);
        store.append(record(4)).await.unwrap();

        let batch = tokio::time::timeout(WAIT, sub.next_batch())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(batch.iter().map(n_of).collect::<Vec<_>>(), vec![4]);
    }

    #[tokio::test]
    async fn subscribers_are_isolated() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let early = store.subscribe().into_stream();
        store.append(record(1)).await.unwrap();

        let late = store.subscribe().into_stream();
        let dropped = store.subscribe();
        drop(dropped);
        store.append(record(2)).await.unwrap();

        let early = tokio::time::timeout(WAIT, collect_n(early, 2))
            .await
            .unwrap();
        let late = tokio::time::timeout(WAIT, collect_n(late, 1))
            .await
            .unwrap();

        assert_eq!(early, vec![1, 2]);
        assert_eq!(late, vec![2]);
    }

    #[tokio::test]
    async fn subscribe_from_cursor_replays_the_gap() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        for n in 1..=5 {
            store.append(record(n)).await.unwrap();
        }

        let mut sub = store.subscribe_from(2).with_batch_size(2);
        let first = sub.next_batch().await.unwrap().unwrap();
        let second = sub.next_batch().await.unwrap().unwrap();

        assert_eq!(first.iter().map(n_of).collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(second.iter().map(n_of).collect::<Vec<_>>(), vec![5]);
        assert_eq!(sub.cursor(), 5);
    }

    #[tokio::test]
    async fn slow_subscriber_does_not_block_appends() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let mut stalled = store.subscribe();

        // Nobody reads `stalled` while many records go in.
        tokio::time::timeout(WAIT, async {
            for n in 0..1000 {
                store.append(record(n)).await.unwrap();
            }
        })
        .await
        .expect("appends should not wait on subscribers");

        let batch = stalled.next_batch().await.unwrap().unwrap();
        assert_eq!(batch.len(), DEFAULT_BATCH_SIZE);
        assert_eq!(n_of(&batch[0]), 0);
    }
}
