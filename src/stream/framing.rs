//! Newline framing for NDJSON response bodies.
//!
//! The query server writes one JSON object per line. Response bodies arrive
//! in arbitrary chunks, so a record can be split anywhere, including inside
//! a UTF-8 sequence. `FrameDecoder` buffers bytes until a `\n` arrives and
//! hands out each complete line without copying it.
//!
//! # Wire Format
//!
//! ```text
//! {"columns":[...],"total":2}\n
//! {"rows":[[1],[2]]}\n
//! ```
//!
//! A `\r` right before the `\n` is stripped, so CRLF bodies decode the same.

use bytes::{Bytes, BytesMut};
use thiserror::Error;

/// Default maximum line length (16MB) to bound memory under a broken sender.
pub const DEFAULT_MAX_LINE_LEN: usize = 16 * 1024 * 1024;

/// Frame-level errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// A line (complete or still pending) grew past the configured bound.
    ///
    /// Carries only the bound: how much of the line had arrived when the
    /// check fired depends on chunking.
    #[error("Line exceeds maximum {max} bytes")]
    LineTooLong { max: usize },
}

/// Incremental splitter from body chunks to complete lines.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    /// Bytes at the front of `buffer` already known to contain no newline.
    scanned: usize,
    max_line_len: usize,
    poisoned: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LEN)
    }
}

impl FrameDecoder {
    pub fn new(max_line_len: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            scanned: 0,
            max_line_len,
            poisoned: false,
        }
    }

    /// Append a chunk and iterate the lines it completes.
    ///
    /// Lines are produced lazily; bytes after the last newline stay buffered
    /// for the next call. Empty lines are skipped. Once a line exceeds the
    /// maximum length the iterator yields `FrameError::LineTooLong` a single
    /// time and the decoder ignores all further input.
    pub fn feed(&mut self, chunk: &[u8]) -> Frames<'_> {
        if !self.poisoned {
            self.buffer.extend_from_slice(chunk);
        }
        Frames { decoder: self }
    }

    /// Drop any buffered partial line at end of stream.
    ///
    /// Returns the length of the discarded bytes when a truncated record was
    /// pending, `None` when the stream ended cleanly on a newline. A second
    /// call always returns `None`.
    pub fn finish(&mut self) -> Option<usize> {
        let pending = self.buffer.len();
        self.buffer.clear();
        self.scanned = 0;
        (pending > 0 && !self.poisoned).then_some(pending)
    }

    /// Number of bytes waiting for a newline.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn max_line_len(&self) -> usize {
        self.max_line_len
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    fn poison(&mut self) -> FrameError {
        self.poisoned = true;
        self.buffer = BytesMut::new();
        self.scanned = 0;
        FrameError::LineTooLong {
            max: self.max_line_len,
        }
    }

    fn next_frame(&mut self) -> Option<Result<Bytes, FrameError>> {
        loop {
            if self.poisoned {
                return None;
            }

            let newline = self.buffer[self.scanned..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|pos| self.scanned + pos);

            let Some(pos) = newline else {
                self.scanned = self.buffer.len();
                // A trailing `\r` may still turn out to be part of the terminator.
                let pending =
                    self.buffer.len() - usize::from(self.buffer.last() == Some(&b'\r'));
                if pending > self.max_line_len {
                    return Some(Err(self.poison()));
                }
                return None;
            };

            // Take the line plus its terminator, then drop the terminator.
            let mut line = self.buffer.split_to(pos + 1);
            self.scanned = 0;
            line.truncate(pos);
            if line.last() == Some(&b'\r') {
                line.truncate(pos - 1);
            }

            if line.len() > self.max_line_len {
                return Some(Err(self.poison()));
            }
            if line.is_empty() {
                continue;
            }
            return Some(Ok(line.freeze()));
        }
    }
}

/// Lazy iterator over the lines completed by one `feed` call.
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
}

impl Iterator for Frames<'_> {
    type Item = Result<Bytes, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.decoder.next_frame()
    }
}
