//! Event sinks for streamed query results.

use std::sync::mpsc::Sender;

use crate::models::{ColumnInfo, Row};

/// Events emitted while a query result streams in.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Result schema plus the server's advertised row total.
    Header { columns: Vec<ColumnInfo>, total: u64 },
    /// One batch of rows, in server order.
    Rows(Vec<Row>),
    /// Record-level or stream-level error message.
    Error(String),
    /// Normal end of stream with the consumer's own row tally.
    Complete { total_rows: u64 },
}

/// Receiver of stream events, one method per event kind.
///
/// Implementations run on whatever task drives the stream and must not
/// block for long; forwarding to a channel is the usual approach.
pub trait StreamSink {
    fn on_header(&mut self, columns: Vec<ColumnInfo>, total: u64);

    fn on_rows(&mut self, rows: Vec<Row>);

    fn on_error(&mut self, message: String);

    fn on_complete(&mut self, total_rows: u64);
}

/// Records every event in order. Handy for tests and headless runs.
impl StreamSink for Vec<StreamEvent> {
    fn on_header(&mut self, columns: Vec<ColumnInfo>, total: u64) {
        self.push(StreamEvent::Header { columns, total });
    }

    fn on_rows(&mut self, rows: Vec<Row>) {
        self.push(StreamEvent::Rows(rows));
    }

    fn on_error(&mut self, message: String) {
        self.push(StreamEvent::Error(message));
    }

    fn on_complete(&mut self, total_rows: u64) {
        self.push(StreamEvent::Complete { total_rows });
    }
}

impl<S: StreamSink + ?Sized> StreamSink for &mut S {
    fn on_header(&mut self, columns: Vec<ColumnInfo>, total: u64) {
        (**self).on_header(columns, total);
    }

    fn on_rows(&mut self, rows: Vec<Row>) {
        (**self).on_rows(rows);
    }

    fn on_error(&mut self, message: String) {
        (**self).on_error(message);
    }

    fn on_complete(&mut self, total_rows: u64) {
        (**self).on_complete(total_rows);
    }
}

/// A stream event tagged with the query that produced it.
///
/// The UI only applies updates whose `query_id` matches its active query,
/// so events still queued from a replaced query are dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryUpdate {
    pub query_id: usize,
    pub event: StreamEvent,
}

/// Forwards events to the UI thread over an unbounded channel.
///
/// The channel never applies backpressure; every decoded row is queued.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    query_id: usize,
    tx: Sender<QueryUpdate>,
}

impl ChannelSink {
    pub fn new(query_id: usize, tx: Sender<QueryUpdate>) -> Self {
        Self { query_id, tx }
    }

    fn send(&self, event: StreamEvent) {
        if self
            .tx
            .send(QueryUpdate {
                query_id: self.query_id,
                event,
            })
            .is_err()
        {
            tracing::debug!(query_id = self.query_id, "Update receiver dropped");
        }
    }
}

impl StreamSink for ChannelSink {
    fn on_header(&mut self, columns: Vec<ColumnInfo>, total: u64) {
        self.send(StreamEvent::Header { columns, total });
    }

    fn on_rows(&mut self, rows: Vec<Row>) {
        self.send(StreamEvent::Rows(rows));
    }

    fn on_error(&mut self, message: String) {
        self.send(StreamEvent::Error(message));
    }

    fn on_complete(&mut self, total_rows: u64) {
        self.send(StreamEvent::Complete { total_rows });
    }
}
