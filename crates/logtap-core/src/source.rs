// ABOUTME: Tails an append-only text file, yielding complete lines written after it was opened.
// ABOUTME: Waits for the file to appear, buffers partial lines across polls, and fails if the file disappears.

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::Stream;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};

/// Default delay between reads that find no new data.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Errors that end a line source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot open {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("source {} was lost: {source}", path.display())]
    Lost { path: PathBuf, source: io::Error },
}

/// A tail over one file. Only content appended after `open` returns is
/// delivered, and each line is delivered once.
pub struct LineSource {
    path: PathBuf,
    poll_interval: Duration,
    reader: BufReader<File>,
    /// Bytes consumed from the file so far, used to detect truncation.
    position: u64,
    /// Bytes of a line whose newline has not been written yet.
    partial: Vec<u8>,
}

impl LineSource {
    /// Open `path` positioned at its current end. If the file does not exist
    /// yet, poll every `poll_interval` until it does. Other open failures are
    /// returned immediately.
    pub async fn open(path: impl AsRef<Path>, poll_interval: Duration) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let mut waiting = false;

        let mut file = loop {
            match File::open(&path).await {
                Ok(file) => break file,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    if !waiting {
                        tracing::info!(path = %path.display(), "source does not exist yet, waiting for it");
                        waiting = true;
                    }
                    tokio::time::sleep(poll_interval).await;
                }
                Err(source) => return Err(SourceError::Open { path, source }),
            }
        };

        let position = file
            .seek(SeekFrom::End(0))
            .await
            .map_err(|source| SourceError::Open {
                path: path.clone(),
                source,
            })?;
        tracing::info!(path = %path.display(), position, "tailing source");

        Ok(Self {
            path,
            poll_interval,
            reader: BufReader::new(file),
            position,
            partial: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the next complete line. The trailing `\n` (and `\r`, if any)
    /// is removed; invalid UTF-8 is replaced rather than rejected.
    pub async fn next_line(&mut self) -> Result<String, SourceError> {
        loop {
            let n = self
                .reader
                .read_until(b'\n', &mut self.partial)
                .await
                .map_err(|source| self.lost(source))?;
            self.position += n as u64;

            if self.partial.last() == Some(&b'\n') {
                let mut bytes = std::mem::take(&mut self.partial);
                bytes.pop();
                if bytes.last() == Some(&b'\r') {
                    bytes.pop();
                }
                return Ok(String::from_utf8_lossy(&bytes).into_owned());
            }

            if n == 0 {
                self.check_source().await?;
                tokio::time::sleep(self.poll_interval).await;
            }
        }
    }

    /// Turn the source into a stream of lines. The stream ends after the
    /// first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<String, SourceError>> {
        futures::stream::unfold(Some(self), |state| async move {
            let mut source = state?;
            match source.next_line().await {
                Ok(line) => Some((Ok(line), Some(source))),
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    /// Called when a read finds nothing new: make sure the path still holds
    /// the file we are reading and that it has not been truncated under us.
    async fn check_source(&mut self) -> Result<(), SourceError> {
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .map_err(|source| self.lost(source))?;
        let current = self
            .reader
            .get_ref()
            .metadata()
            .await
            .map_err(|source| self.lost(source))?;

        if !same_file(&current, &metadata) {
            // Everything up to EOF of the old file has been read already.
            let file = File::open(&self.path)
                .await
                .map_err(|source| self.lost(source))?;
            tracing::info!(
                path = %self.path.display(),
                dropped_partial = self.partial.len(),
                "source was replaced, following the new file from its start"
            );
            self.reader = BufReader::new(file);
            self.position = 0;
            self.partial.clear();
            return Ok(());
        }

        if metadata.len() < self.position {
            tracing::warn!(
                path = %self.path.display(),
                size = metadata.len(),
                position = self.position,
                "source was truncated, resuming from its new end"
            );
            let position = self
                .reader
                .seek(SeekFrom::End(0))
                .await
                .map_err(|source| self.lost(source))?;
            self.position = position;
            self.partial.clear();
        }

        Ok(())
    }

    fn lost(&self, source: io::Error) -> SourceError {
        SourceError::Lost {
            path: self.path.clone(),
            source,
        }
    }
}

/// Whether two metadata snapshots describe the same file on disk.
#[cfg(unix)]
fn same_file(a: &std::fs::Metadata, b: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    a.dev() == b.dev() && a.ino() == b.ino()
}

/// Without inode numbers a replaced file is indistinguishable from a
/// truncated one, which the length check still covers.
#[cfg(not(unix))]
fn same_file(_a: &std::fs::Metadata, _b: &std::fs::Metadata) -> bool {
    true
}
