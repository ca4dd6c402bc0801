//! Per-query stream state.
//!
//! `StreamConsumer` owns everything one in-flight response needs: the frame
//! buffer, the record interpreter, the sink, and the terminal outcome. It is
//! created when a query starts and dropped when the response completes,
//! fails or is cancelled; it is never reused.

use tracing::{debug, error, info, warn};

use crate::stream::framing::{FrameDecoder, DEFAULT_MAX_LINE_LEN};
use crate::stream::interpreter::{RecordInterpreter, StreamStats};
use crate::stream::sink::StreamSink;

/// How a stream ended. Exactly one outcome is reached per stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Transport ended normally; a completion event was sent.
    Completed { total_rows: u64 },
    /// Transport or framing failed; one stream-level error was sent.
    Failed,
    /// Aborted by the caller; no terminal event was sent.
    Cancelled,
}

/// Streaming result consumer for one query.
pub struct StreamConsumer<S> {
    decoder: FrameDecoder,
    interpreter: RecordInterpreter,
    sink: S,
    outcome: Option<StreamOutcome>,
}

impl<S: StreamSink> StreamConsumer<S> {
    pub fn new(sink: S) -> Self {
        Self::with_max_line_len(sink, DEFAULT_MAX_LINE_LEN)
    }

    pub fn with_max_line_len(sink: S, max_line_len: usize) -> Self {
        Self {
            decoder: FrameDecoder::new(max_line_len),
            interpreter: RecordInterpreter::new(),
            sink,
            outcome: None,
        }
    }

    /// Process one body chunk.
    ///
    /// Every record the chunk completes is dispatched before this returns.
    /// Does nothing once the stream has reached an outcome.
    pub fn feed(&mut self, chunk: &[u8]) {
        if self.outcome.is_some() {
            return;
        }

        let mut overflow = None;
        for frame in self.decoder.feed(chunk) {
            match frame {
                Ok(line) => self.interpreter.interpret(&line, &mut self.sink),
                Err(e) => {
                    overflow = Some(e);
                    break;
                }
            }
        }

        if let Some(e) = overflow {
            error!("Aborting stream: {}", e);
            self.terminate_with_error(e.to_string());
        }
    }

    /// Transport reached end of body without error.
    ///
    /// A partial record left in the buffer is reported as an error event,
    /// then the completion event carries the consumer's own row tally.
    pub fn finish(&mut self) {
        if self.outcome.is_some() {
            return;
        }

        if let Some(len) = self.decoder.finish() {
            warn!("Stream ended with a truncated record ({} bytes discarded)", len);
            self.sink.on_error(format!(
                "Truncated record at end of stream ({} bytes discarded)",
                len
            ));
        }

        let total_rows = self.interpreter.total_rows_seen();
        let stats = self.interpreter.stats();
        info!(
            total_rows,
            records = stats.records,
            decode_failures = stats.decode_failures,
            "Stream complete"
        );
        self.outcome = Some(StreamOutcome::Completed { total_rows });
        self.sink.on_complete(total_rows);
    }

    /// Transport failed (connection reset, timeout, TLS error...).
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.outcome.is_some() {
            return;
        }
        let message = message.into();
        error!("Stream failed: {}", message);
        self.terminate_with_error(message);
    }

    /// Report a record-level error that did not come from the body.
    ///
    /// The stream keeps going; ignored once it has reached an outcome.
    pub fn report_error(&mut self, message: impl Into<String>) {
        if self.outcome.is_some() {
            return;
        }
        let message = message.into();
        warn!("Stream error: {}", message);
        self.sink.on_error(message);
    }

    /// Abort without sending any further events.
    pub fn cancel(&mut self) {
        if self.outcome.is_some() {
            return;
        }
        debug!(
            rows = self.interpreter.total_rows_seen(),
            "Stream cancelled"
        );
        self.decoder.finish();
        self.outcome = Some(StreamOutcome::Cancelled);
    }

    fn terminate_with_error(&mut self, message: String) {
        self.decoder.finish();
        self.outcome = Some(StreamOutcome::Failed);
        self.sink.on_error(message);
    }

    pub fn outcome(&self) -> Option<StreamOutcome> {
        self.outcome
    }

    pub fn is_terminated(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn total_rows_seen(&self) -> u64 {
        self.interpreter.total_rows_seen()
    }

    pub fn header_seen(&self) -> bool {
        self.interpreter.header_seen()
    }

    pub fn stats(&self) -> StreamStats {
        self.interpreter.stats()
    }

    /// Bytes waiting for a newline.
    pub fn buffered_len(&self) -> usize {
        self.decoder.buffered_len()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}
