//! Record interpretation: one decoded NDJSON line into typed events.

use tracing::{debug, warn};

use crate::models::Record;
use crate::stream::sink::StreamSink;

/// Counters kept for one stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Complete lines handed to the interpreter.
    pub frames: u64,
    /// Lines that parsed as records.
    pub records: u64,
    /// Lines that failed to parse and were skipped.
    pub decode_failures: u64,
    /// Rows dispatched so far.
    pub rows: u64,
    /// Error records received from the server.
    pub error_records: u64,
}

/// Decodes complete lines and dispatches events to a sink.
///
/// Holds the per-stream counters that outlive a single record: the row
/// tally reported on completion, whether a header was seen, and the last
/// total the server advertised.
#[derive(Debug, Default)]
pub struct RecordInterpreter {
    header_seen: bool,
    advertised_total: Option<u64>,
    warned_headerless_rows: bool,
    stats: StreamStats,
}

impl RecordInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one line and emit the events it carries.
    ///
    /// A line that is not a valid record is logged and counted, never
    /// propagated: one bad record must not end an otherwise healthy stream.
    pub fn interpret<S: StreamSink + ?Sized>(&mut self, line: &[u8], sink: &mut S) {
        self.stats.frames += 1;

        let record: Record = match serde_json::from_slice(line) {
            Ok(record) => record,
            Err(e) => {
                self.stats.decode_failures += 1;
                warn!(
                    "Failed to decode record ({} bytes): {}",
                    line.len(),
                    e
                );
                return;
            }
        };
        self.stats.records += 1;
        self.dispatch(record, sink);
    }

    fn dispatch<S: StreamSink + ?Sized>(&mut self, record: Record, sink: &mut S) {
        if let Some(message) = record.error.filter(|m| !m.is_empty()) {
            self.stats.error_records += 1;
            warn!("Server reported error: {}", message);
            sink.on_error(message);
            return;
        }

        if let Some(columns) = record.columns {
            if self.header_seen {
                warn!("Received a second header; replacing the previous schema");
            }
            let total = record.total.or(self.advertised_total).unwrap_or(0);
            self.header_seen = true;
            self.advertised_total = Some(total);
            debug!(columns = columns.len(), total, "Header received");
            sink.on_header(columns, total);
        }

        if let Some(rows) = record.rows {
            if rows.is_empty() {
                return;
            }
            if !self.header_seen && !self.warned_headerless_rows {
                self.warned_headerless_rows = true;
                warn!("Rows arrived before any header");
            }
            self.stats.rows += rows.len() as u64;
            debug!(batch = rows.len(), seen = self.stats.rows, "Rows received");
            sink.on_rows(rows);
        }
    }

    /// Rows dispatched so far.
    pub fn total_rows_seen(&self) -> u64 {
        self.stats.rows
    }

    pub fn header_seen(&self) -> bool {
        self.header_seen
    }

    /// Last row total advertised by a header record.
    pub fn advertised_total(&self) -> Option<u64> {
        self.advertised_total
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }
}
