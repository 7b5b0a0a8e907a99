// ABOUTME: Incremental brace-depth scanner that carves JSON object candidates out of a line stream.
// ABOUTME: Owns the rolling extraction buffer; one extractor per ingestion source, never shared.

/// Default cap on bytes retained while waiting for an object to balance.
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 1024 * 1024;

/// Carves balanced `{ ... }` spans out of text that arrives one line at a time.
///
/// Depth is counted on every brace byte, including braces that sit inside
/// JSON string values. A string value containing an unmatched `{` or `}`
/// therefore shifts the boundary of the object it belongs to; the resulting
/// candidate normally fails to parse and is skipped downstream.
///
/// Scan progress is kept between calls, so an object that trickles in over
/// many lines is scanned once rather than once per line.
#[derive(Debug, Default)]
pub struct ObjectExtractor {
    buffer: String,
    /// Brace depth at `scanned`. Only meaningful while `scanned > 0`.
    depth: usize,
    /// Bytes of `buffer` already scanned. Zero means no object is open and
    /// the buffer has not been searched for an opening brace yet.
    scanned: usize,
    max_buffer: Option<usize>,
    discarded: u64,
}

impl ObjectExtractor {
    /// An extractor with no cap on the retained buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// An extractor that drops its buffer once an unbalanced object grows past
    /// `max_bytes`. Zero disables the cap.
    pub fn with_max_buffer(max_bytes: usize) -> Self {
        Self {
            max_buffer: (max_bytes > 0).then_some(max_bytes),
            ..Self::default()
        }
    }

    /// Append one line (its newline is restored) and return every candidate
    /// it completed, in source order.
    pub fn push_line(&mut self, line: &str) -> Vec<String> {
        self.buffer.push_str(line);
        self.buffer.push('\n');

        let mut candidates = Vec::new();
        loop {
            if self.scanned == 0 {
                match self.buffer.find('{') {
                    Some(start) => {
                        self.discard_prefix(start);
                    }
                    None => {
                        let len = self.buffer.len();
                        self.discard_prefix(len);
                        break;
                    }
                }
            }

            match self.scan() {
                Some(end) => {
                    candidates.push(self.buffer[..end].to_string());
                    self.buffer.drain(..end);
                    self.scanned = 0;
                    self.depth = 0;
                }
                None => break,
            }
        }

        if let Some(max) = self.max_buffer
            && self.buffer.len() > max
        {
            tracing::warn!(
                retained = self.buffer.len(),
                max,
                "extraction buffer exceeded its cap without balancing, discarding"
            );
            let len = self.buffer.len();
            self.discard_prefix(len);
        }

        candidates
    }

    /// Bytes currently held while waiting for an object to close.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes dropped so far: text outside any object plus overflow discards.
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded
    }

    /// Continue scanning from where the previous call stopped. Returns the
    /// exclusive end of the candidate once depth returns to zero.
    fn scan(&mut self) -> Option<usize> {
        let bytes = self.buffer.as_bytes();
        for (i, &b) in bytes.iter().enumerate().skip(self.scanned) {
            match b {
                b'{' => self.depth += 1,
                b'}' => {
                    // The buffer always starts at an opening brace, so depth
                    // is at least one here.
                    self.depth -= 1;
                    if self.depth == 0 {
                        return Some(i + 1);
                    }
                }
                _ => {}
            }
        }
        self.scanned = bytes.len();
        None
    }

    fn discard_prefix(&mut self, len: usize) {
        if len == 0 {
            return;
        }
        self.buffer.drain(..len);
        self.discarded += len as u64;
        self.scanned = 0;
        self.depth = 0;
    }
}
