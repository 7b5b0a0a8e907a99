// ABOUTME: Core library for logtap: tails a text source, carves JSON objects out of it, and stores them.
// ABOUTME: Defines the record model, the RecordStore contract, the in-memory store, and the ingestion task.

pub mod extract;
pub mod ingest;
pub mod memory;
pub mod parse;
pub mod record;
pub mod source;
pub mod store;
pub mod subscription;

pub use extract::ObjectExtractor;
pub use ingest::{IngestConfig, IngestError, IngestHandle, IngestStats, IngestSummary, spawn_ingestor};
pub use memory::MemoryStore;
pub use parse::{ParseError, parse_candidate, sanitize};
pub use record::{NewRecord, Record};
pub use source::{LineSource, SourceError};
pub use store::{RecordStore, StoreError, SubscribeExt};
pub use subscription::Subscription;
