//! Banquet TUI Library
//!
//! This library provides the core components for the Banquet TUI:
//!
//! - `stream` - Streaming NDJSON result consumer (framing, records, events)
//! - `client` - HTTP client that drives query responses into the consumer
//! - `config` - Server discovery and limits from the environment
//! - `models` - Wire types shared with the query server
//!
//! # Streaming a Query
//!
//! ```ignore
//! use banquet_tui::client::QueryClient;
//! use banquet_tui::config::Config;
//! use banquet_tui::stream::StreamEvent;
//! use tokio_util::sync::CancellationToken;
//!
//! let client = QueryClient::new(&Config::from_env()?)?;
//! let cancel = CancellationToken::new();
//! let consumer = client
//!     .stream_query("Index.sqlite/tb0?limit=100", Vec::<StreamEvent>::new(), &cancel)
//!     .await;
//! println!("{:?}", consumer.outcome());
//! ```

pub mod client;
pub mod config;
pub mod models;
pub mod stream;
