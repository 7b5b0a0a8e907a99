// ABOUTME: Append-only JSONL record log with an in-memory read side.
// ABOUTME: Each append is written and fsynced before it becomes visible; open repairs torn lines and replays.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use logtap_core::{MemoryStore, NewRecord, Record, RecordStore, StoreError};
use thiserror::Error;
use tokio::sync::watch;
use ulid::Ulid;

/// Errors that can occur during JSONL log operations.
#[derive(Debug, Error)]
pub enum JsonlError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("log file lock poisoned")]
    Poisoned,
}

impl From<JsonlError> for StoreError {
    fn from(err: JsonlError) -> Self {
        StoreError::backend(err)
    }
}

/// A record store persisted as one JSON-serialized [`Record`] per line.
///
/// Reads never touch the file: every record is also held in a
/// [`MemoryStore`], which the log is replayed into at open. `seq` values are
/// renumbered from 1 on replay, so they are only stable within one process;
/// `id` is the durable identity.
pub struct JsonlStore {
    path: PathBuf,
    log: Arc<Mutex<LogFile>>,
    /// Serializes appends so the file order and the in-memory order agree.
    append_lock: tokio::sync::Mutex<()>,
    memory: MemoryStore,
}

impl JsonlStore {
    /// Open (or create) the log at `path`, repair any unparseable lines, and
    /// load its records.
    pub async fn open(path: &Path) -> Result<Self, JsonlError> {
        let path = path.to_path_buf();
        let (log, records) = tokio::task::spawn_blocking({
            let path = path.clone();
            move || -> Result<(LogFile, Vec<Record>), JsonlError> {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let records = if path.exists() { load(&path)? } else { Vec::new() };
                let file = OpenOptions::new().create(true).append(true).open(&path)?;
                let committed_len = file.metadata()?.len();
                Ok((LogFile { file, committed_len }, records))
            }
        })
        .await??;

        tracing::info!(path = %path.display(), records = records.len(), "opened jsonl store");

        Ok(Self {
            path,
            log: Arc::new(Mutex::new(log)),
            append_lock: tokio::sync::Mutex::new(()),
            memory: MemoryStore::with_records(records),
        })
    }

    /// Returns the path to the underlying JSONL file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_line(&self, record: &Record) -> Result<(), JsonlError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let log = Arc::clone(&self.log);
        tokio::task::spawn_blocking(move || -> Result<(), JsonlError> {
            let mut log = log.lock().map_err(|_| JsonlError::Poisoned)?;
            log.append_line(&line)
        })
        .await?
    }
}

/// The open log plus the length of its last fully written line.
struct LogFile {
    file: File,
    committed_len: u64,
}

impl LogFile {
    /// Append one newline-terminated line and fsync it. Either the whole line
    /// is committed or the file is cut back to `committed_len`; bytes left
    /// behind by an earlier failed write are cut before writing.
    fn append_line(&mut self, line: &[u8]) -> Result<(), JsonlError> {
        let len = self.file.metadata()?.len();
        if len > self.committed_len {
            tracing::warn!(
                torn = len - self.committed_len,
                "discarding torn bytes at the end of the jsonl log"
            );
            self.file.set_len(self.committed_len)?;
        }

        if let Err(e) = self.file.write_all(line).and_then(|()| self.file.sync_all()) {
            // If this fails too, the next append cuts the tail again.
            let _ = self.file.set_len(self.committed_len);
            return Err(e.into());
        }
        self.committed_len += line.len() as u64;
        Ok(())
    }
}

/// Read every parseable record from the log, renumbering `seq` by position.
/// If any line fails to parse (typically a torn final write) the file is
/// rewritten with only the good lines.
fn load(path: &Path) -> Result<Vec<Record>, JsonlError> {
    let contents = fs::read_to_string(path)?;
    let mut records = Vec::new();
    let mut valid_lines = Vec::new();
    let mut dropped = 0usize;

    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Record>(line) {
            Ok(mut record) => {
                record.seq = records.len() as u64 + 1;
                records.push(record);
                valid_lines.push(line.to_string());
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "dropping unreadable jsonl line");
                dropped += 1;
            }
        }
    }

    // A final line without its newline would get the next append glued onto it.
    let unterminated = !contents.is_empty() && !contents.ends_with('\n');
    if dropped > 0 || unterminated {
        rewrite(path, &valid_lines)?;
        tracing::info!(path = %path.display(), dropped, kept = valid_lines.len(), "repaired jsonl store");
    }

    Ok(records)
}

/// Replace the log with `lines` via temp file, fsync, and atomic rename.
fn rewrite(path: &Path, lines: &[String]) -> Result<(), JsonlError> {
    let tmp_path = path.with_extension("jsonl.tmp");
    let mut tmp_file = File::create(&tmp_path)?;
    for line in lines {
        writeln!(tmp_file, "{}", line)?;
    }
    tmp_file.sync_all()?;
    fs::rename(&tmp_path, path)?;

    // Make the rename itself durable. If this fails the data is already
    // consistent, so the error is ignored.
    if let Some(parent) = path.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }
    Ok(())
}

#[async_trait]
impl RecordStore for JsonlStore {
    async fn append(&self, record: NewRecord) -> Result<Record, StoreError> {
        let _guard = self.append_lock.lock().await;

        let id = Ulid::new().to_string();
        let pending = record.clone().into_record(self.memory.head() + 1, Some(id.clone()));
        self.write_line(&pending).await?;

        Ok(self.memory.append_with_id(record, Some(id)).await)
    }

    async fn snapshot(&self, limit: usize) -> Result<Vec<Record>, StoreError> {
        self.memory.snapshot(limit).await
    }

    async fn latest(&self) -> Result<Record, StoreError> {
        self.memory.latest().await
    }

    async fn records_after(&self, cursor: u64, limit: usize) -> Result<Vec<Record>, StoreError> {
        self.memory.records_after(cursor, limit).await
    }

    async fn len(&self) -> Result<u64, StoreError> {
        self.memory.len().await
    }

    fn head(&self) -> u64 {
        self.memory.head()
    }

    fn watch_head(&self) -> watch::Receiver<u64> {
        self.memory.watch_head()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logtap_core::SubscribeExt;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(n: i64) -> NewRecord {
        let serde_json::Value::Object(payload) = json!({ "n": n }) else {
            unreachable!()
        };
        NewRecord::new(payload)
    }

    #[tokio::test]
    async fn append_and_reopen_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.jsonl");

        let store = JsonlStore::open(&path).await.unwrap();
        let first = store.append(record(1)).await.unwrap();
        store.append(record(2)).await.unwrap();
        store.append(record(3)).await.unwrap();
        drop(store);

        let reopened = JsonlStore::open(&path).await.unwrap();
        assert_eq!(reopened.len().await.unwrap(), 3);
        assert_eq!(reopened.head(), 3);

        let snap = reopened.snapshot(10).await.unwrap();
        assert_eq!(snap[2].id, first.id);
        assert_eq!(snap[2].created_at, first.created_at);
        assert_eq!(snap[0].payload["n"], 3);
    }

    #[tokio::test]
    async fn empty_store_reports_no_data() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::open(&dir.path().join("nested/dir/records.jsonl"))
            .await
            .unwrap();
        assert!(matches!(store.latest().await, Err(StoreError::NoData)));
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn open_repairs_torn_tail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.jsonl");

        let store = JsonlStore::open(&path).await.unwrap();
        store.append(record(1)).await.unwrap();
        store.append(record(2)).await.unwrap();
        drop(store);

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        write!(file, r#"{{"seq":3,"id":"01TORN","created_at":"2024-"#).unwrap();
        drop(file);

        let store = JsonlStore::open(&path).await.unwrap();
        assert_eq!(store.len().await.unwrap(), 2);

        let next = store.append(record(3)).await.unwrap();
        assert_eq!(next.seq, 3);
        drop(store);

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 3);
        assert!(!contents.contains("01TORN"));
    }

    #[tokio::test]
    async fn append_after_a_torn_write_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.jsonl");

        let store = JsonlStore::open(&path).await.unwrap();
        store.append(record(1)).await.unwrap();

        // What a failed write leaves behind: part of a line and no newline.
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        write!(file, r#"{{"seq":2,"id":"01TORN","created_at":"#).unwrap();
        drop(file);

        let acked = store.append(record(2)).await.unwrap();
        drop(store);

        let reopened = JsonlStore::open(&path).await.unwrap();
        assert_eq!(reopened.len().await.unwrap(), 2);
        let latest = reopened.latest().await.unwrap();
        assert_eq!(latest.id, acked.id);
        assert_eq!(latest.payload["n"], 2);

        let contents = fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("01TORN"));
        assert!(contents.ends_with('\n'));
    }

    #[tokio::test]
    async fn ids_are_unique_ulids() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::open(&dir.path().join("records.jsonl"))
            .await
            .unwrap();

        let a = store.append(record(1)).await.unwrap();
        let b = store.append(record(2)).await.unwrap();
        let a_id = a.id.unwrap();
        assert_ne!(Some(a_id.clone()), b.id);
        assert!(a_id.parse::<Ulid>().is_ok());
    }

    #[tokio::test]
    async fn subscribers_see_appends() {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn RecordStore> = Arc::new(
            JsonlStore::open(&dir.path().join("records.jsonl"))
                .await
                .unwrap(),
        );
        store.append(record(1)).await.unwrap();

        let mut sub = store.subscribe();
        store.append(record(2)).await.unwrap();

        let batch = sub.next_batch().await.unwrap().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].payload["n"], 2);
    }
}
