// ABOUTME: Durable RecordStore backends for logtap.
// ABOUTME: JsonlStore keeps an fsynced append-only log replayed at open; SqliteStore keeps an indexed table.

pub mod jsonl;
pub mod sqlite;

pub use jsonl::{JsonlError, JsonlStore};
pub use sqlite::{SqliteError, SqliteStore};
