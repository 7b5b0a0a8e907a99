// ABOUTME: SQLite-backed RecordStore: one records table indexed by creation time, newest first.
// ABOUTME: Blocking calls run on the blocking pool; the writer and readers use separate WAL connections.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use logtap_core::record::format_timestamp;
use logtap_core::{NewRecord, Record, RecordStore, StoreError};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::watch;
use ulid::Ulid;

const SELECT_COLUMNS: &str = "SELECT seq, id, created_at, payload FROM records";

/// Errors that can occur during SQLite store operations.
#[derive(Debug, Error)]
pub enum SqliteError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("connection lock poisoned")]
    Poisoned,
}

impl From<SqliteError> for StoreError {
    fn from(err: SqliteError) -> Self {
        StoreError::backend(err)
    }
}

/// A durable record store in a single SQLite file.
///
/// `seq` is the table's autoincrement key, so it survives restarts and is
/// never reused. `id` is a ULID assigned at append.
pub struct SqliteStore {
    path: PathBuf,
    writer: Arc<Mutex<Connection>>,
    reader: Arc<Mutex<Connection>>,
    head_tx: watch::Sender<u64>,
}

impl SqliteStore {
    /// Open or create the database at `path` and make sure the schema exists.
    pub fn open(path: &Path) -> Result<Self, SqliteError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let writer = Connection::open(path)?;
        writer.execute_batch("PRAGMA journal_mode=WAL;")?;
        writer.busy_timeout(Duration::from_secs(5))?;
        writer.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                payload TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_records_created_at
                ON records (created_at DESC);",
        )?;

        let head: i64 =
            writer.query_row("SELECT COALESCE(MAX(seq), 0) FROM records", [], |row| row.get(0))?;

        let reader = Connection::open(path)?;
        reader.busy_timeout(Duration::from_secs(5))?;

        tracing::info!(path = %path.display(), head, "opened sqlite store");

        let (head_tx, _) = watch::channel(head as u64);
        Ok(Self {
            path: path.to_path_buf(),
            writer: Arc::new(Mutex::new(writer)),
            reader: Arc::new(Mutex::new(reader)),
            head_tx,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` against `conn` on the blocking pool.
    async fn with_conn<T, F>(conn: &Arc<Mutex<Connection>>, f: F) -> Result<T, SqliteError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, SqliteError> + Send + 'static,
    {
        let conn = Arc::clone(conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| SqliteError::Poisoned)?;
            f(&conn)
        })
        .await?
    }

    async fn query(&self, sql: String, args: Vec<i64>) -> Result<Vec<Record>, SqliteError> {
        Self::with_conn(&self.reader, move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(args), row_to_record)?;

            let mut records = Vec::new();
            for row in rows {
                records.push(row?);
            }
            Ok(records)
        })
        .await
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<Record> {
    let seq: i64 = row.get(0)?;
    let id: String = row.get(1)?;
    let created_at: String = row.get(2)?;
    let payload: String = row.get(3)?;

    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);
    let payload: Map<String, Value> = serde_json::from_str(&payload)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

    Ok(Record {
        seq: seq as u64,
        id: Some(id),
        created_at,
        payload,
    })
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn append(&self, record: NewRecord) -> Result<Record, StoreError> {
        let id = Ulid::new().to_string();
        let created_at = format_timestamp(&record.created_at);
        let payload = serde_json::to_string(&record.payload).map_err(SqliteError::from)?;

        let seq = Self::with_conn(&self.writer, {
            let id = id.clone();
            move |conn| {
                conn.execute(
                    "INSERT INTO records (id, created_at, payload) VALUES (?1, ?2, ?3)",
                    params![id, created_at, payload],
                )?;
                Ok(conn.last_insert_rowid() as u64)
            }
        })
        .await?;

        self.head_tx.send_replace(seq);
        Ok(record.into_record(seq, Some(id)))
    }

    async fn snapshot(&self, limit: usize) -> Result<Vec<Record>, StoreError> {
        let records = self
            .query(
                format!("{SELECT_COLUMNS} ORDER BY created_at DESC, seq DESC LIMIT ?1"),
                vec![clamp(limit)],
            )
            .await?;
        if records.is_empty() && (limit > 0 || self.head() == 0) {
            return Err(StoreError::NoData);
        }
        Ok(records)
    }

    async fn latest(&self) -> Result<Record, StoreError> {
        let latest = Self::with_conn(&self.reader, |conn| {
            let record = conn
                .query_row(
                    &format!("{SELECT_COLUMNS} ORDER BY created_at DESC, seq DESC LIMIT 1"),
                    [],
                    row_to_record,
                )
                .optional()?;
            Ok(record)
        })
        .await?;
        latest.ok_or(StoreError::NoData)
    }

    async fn records_after(&self, cursor: u64, limit: usize) -> Result<Vec<Record>, StoreError> {
        let cursor = i64::try_from(cursor).unwrap_or(i64::MAX);
        Ok(self
            .query(
                format!("{SELECT_COLUMNS} WHERE seq > ?1 ORDER BY seq ASC LIMIT ?2"),
                vec![cursor, clamp(limit)],
            )
            .await?)
    }

    async fn len(&self) -> Result<u64, StoreError> {
        let count = Self::with_conn(&self.reader, |conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await?;
        Ok(count)
    }

    fn head(&self) -> u64 {
        *self.head_tx.borrow()
    }

    fn watch_head(&self) -> watch::Receiver<u64> {
        self.head_tx.subscribe()
    }
}

fn clamp(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}
