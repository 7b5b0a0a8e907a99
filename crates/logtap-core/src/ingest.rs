// ABOUTME: The long-running ingestion task: tail the source, extract candidates, parse, and append to the store.
// ABOUTME: Started with spawn_ingestor and stopped cooperatively through IngestHandle::stop.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::extract::{DEFAULT_MAX_BUFFER_BYTES, ObjectExtractor};
use crate::parse::parse_candidate;
use crate::source::{DEFAULT_POLL_INTERVAL, LineSource, SourceError};
use crate::store::RecordStore;

/// Errors that end the ingestion task.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("ingestion task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Settings for one ingestion source.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub source: PathBuf,
    /// Delay between reads that find nothing new, and between checks for a
    /// source that does not exist yet.
    pub poll_interval: Duration,
    /// Delay after every successful append. Caps ingestion at one record per
    /// interval; zero disables it.
    pub pace: Duration,
    /// Cap on bytes held for an unbalanced object; zero disables it.
    pub max_buffer_bytes: usize,
}

impl IngestConfig {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            pace: Duration::ZERO,
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
        }
    }
}

/// Live counters for the ingestion task, shared with whoever wants to report them.
#[derive(Debug, Default)]
pub struct IngestStats {
    lines: AtomicU64,
    candidates: AtomicU64,
    records: AtomicU64,
    parse_failures: AtomicU64,
    persist_failures: AtomicU64,
    discarded_bytes: AtomicU64,
}

/// A point-in-time copy of [`IngestStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub lines: u64,
    pub candidates: u64,
    pub records: u64,
    pub parse_failures: u64,
    pub persist_failures: u64,
    pub discarded_bytes: u64,
}

impl IngestStats {
    pub fn summary(&self) -> IngestSummary {
        IngestSummary {
            lines: self.lines.load(Ordering::Relaxed),
            candidates: self.candidates.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            discarded_bytes: self.discarded_bytes.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

/// Handle to a running ingestion task.
pub struct IngestHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<(), IngestError>>,
    stats: Arc<IngestStats>,
}

impl IngestHandle {
    pub fn stats(&self) -> Arc<IngestStats> {
        Arc::clone(&self.stats)
    }

    /// True once the task has ended, either by `stop` or because the source failed.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Ask the task to stop at its next suspension point and wait for it.
    /// The source file handle is closed before this returns.
    pub async fn stop(self) -> Result<IngestSummary, IngestError> {
        self.cancel.cancel();
        self.join().await
    }

    /// Wait for the task to end on its own (it only does so on source loss).
    pub async fn join(self) -> Result<IngestSummary, IngestError> {
        self.task.await??;
        Ok(self.stats.summary())
    }
}

/// Spawn the ingestion task for one source. Records are appended to `store`
/// in the order their objects appear in the file.
pub fn spawn_ingestor(config: IngestConfig, store: Arc<dyn RecordStore>) -> IngestHandle {
    let cancel = CancellationToken::new();
    let stats = Arc::new(IngestStats::default());

    let task = tokio::spawn(run(config, store, Arc::clone(&stats), cancel.clone()));

    IngestHandle {
        cancel,
        task,
        stats,
    }
}

async fn run(
    config: IngestConfig,
    store: Arc<dyn RecordStore>,
    stats: Arc<IngestStats>,
    cancel: CancellationToken,
) -> Result<(), IngestError> {
    let mut source = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        opened = LineSource::open(&config.source, config.poll_interval) => opened?,
    };
    let mut extractor = ObjectExtractor::with_max_buffer(config.max_buffer_bytes);

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = source.next_line() => match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!(error = %e, "ingestion source failed, stopping");
                    return Err(e.into());
                }
            },
        };
        IngestStats::bump(&stats.lines, 1);

        let discarded_before = extractor.discarded_bytes();
        let candidates = extractor.push_line(&line);
        IngestStats::bump(
            &stats.discarded_bytes,
            extractor.discarded_bytes() - discarded_before,
        );

        for candidate in candidates {
            IngestStats::bump(&stats.candidates, 1);

            let record = match parse_candidate(&candidate) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(error = %e, raw = %candidate, "discarding unparseable candidate");
                    IngestStats::bump(&stats.parse_failures, 1);
                    continue;
                }
            };

            if cancel.is_cancelled() {
                return Ok(());
            }
            // Appends run to completion; cancellation is only checked between them.
            match store.append(record).await {
                Ok(record) => {
                    IngestStats::bump(&stats.records, 1);
                    tracing::debug!(seq = record.seq, "record appended");

                    if !config.pace.is_zero() {
                        tokio::select! {
                            _ = cancel.cancelled() => return Ok(()),
                            _ = tokio::time::sleep(config.pace) => {}
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to persist record, dropping it");
                    IngestStats::bump(&stats.persist_failures, 1);
                }
            }
        }
    }

    tracing::info!(path = %source.path().display(), "ingestion stopped");
    Ok(())
}
