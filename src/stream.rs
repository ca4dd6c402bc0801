//! Streaming result consumer for NDJSON query responses.
//!
//! This module turns the raw body of a `POST /query` response into typed
//! events while the body is still arriving.
//!
//! # Architecture
//!
//! ```text
//! body chunks ──► FrameDecoder ──► RecordInterpreter ──► StreamSink
//!                 (lines)          (records → events)    (Vec, channel)
//! ```
//!
//! `StreamConsumer` ties the pieces together for a single query and tracks
//! its terminal outcome: completed, failed or cancelled.
//!
//! # Protocol
//!
//! One JSON object per `\n`-terminated line. Each record may carry any of:
//!
//! ```text
//! {"columns":[{"name":"id","type":"INTEGER"}],"total":2}
//! {"rows":[[1],[2]]}
//! {"error":"no such table: tb9"}
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use banquet_tui::stream::{StreamConsumer, StreamEvent};
//!
//! let mut consumer = StreamConsumer::new(Vec::<StreamEvent>::new());
//! while let Some(chunk) = body.next().await {
//!     consumer.feed(&chunk?);
//! }
//! consumer.finish();
//! ```

mod consumer;
mod framing;
mod interpreter;
mod sink;

pub use consumer::{StreamConsumer, StreamOutcome};
pub use framing::{FrameDecoder, FrameError, Frames, DEFAULT_MAX_LINE_LEN};
pub use interpreter::{RecordInterpreter, StreamStats};
pub use sink::{ChannelSink, QueryUpdate, StreamEvent, StreamSink};
