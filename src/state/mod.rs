//! State management module.
//!
//! This module contains the MVU/Reducer action types and the results view
//! state that streamed query events are folded into.

use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

use banquet_tui::models::{ColumnInfo, QueryInfo, Row};
use banquet_tui::stream::StreamEvent;

pub mod actions;

pub use actions::*;

// =============================================================================
// Query Status
// =============================================================================

/// Lifecycle of the query shown in the results view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStatus {
    /// No query issued yet.
    Idle,
    /// Rows are still streaming in.
    Running,
    /// Stream ended normally with this many rows.
    Completed { total_rows: u64 },
    /// Stream ended with a transport or protocol error.
    Failed(String),
    /// Cancelled by the user.
    Cancelled,
}

impl QueryStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, QueryStatus::Running)
    }
}

// =============================================================================
// Results State
// =============================================================================

/// State for the streamed results table.
#[derive(Debug)]
pub struct ResultsState {
    /// Banquet URL of the current query.
    pub banquet_url: Option<String>,

    /// Dataset/table summary of the current query.
    pub info: Option<QueryInfo>,

    /// Result schema from the header record.
    pub columns: Vec<ColumnInfo>,

    /// Table schema from the schema endpoint, used until a header arrives.
    pub schema: Vec<ColumnInfo>,

    /// All rows received so far, in server order.
    pub rows: Vec<Row>,

    /// Row total advertised by the server with the header.
    pub advertised_total: Option<u64>,

    /// Number of row batches received.
    pub batches: usize,

    /// Error messages reported during the stream, oldest first.
    pub errors: Vec<String>,

    pub status: QueryStatus,

    /// Index of the first visible row.
    pub scroll: usize,

    /// Wall-clock start time (for display).
    pub started_at: Option<DateTime<Local>>,

    started: Option<Instant>,
    elapsed: Option<Duration>,
}

impl Default for ResultsState {
    fn default() -> Self {
        Self {
            banquet_url: None,
            info: None,
            columns: Vec::new(),
            schema: Vec::new(),
            rows: Vec::new(),
            advertised_total: None,
            batches: 0,
            errors: Vec::new(),
            status: QueryStatus::Idle,
            scroll: 0,
            started_at: None,
            started: None,
            elapsed: None,
        }
    }
}

impl ResultsState {
    /// Clear previous results and start tracking a new query.
    pub fn begin(&mut self, banquet_url: &str) {
        *self = Self {
            banquet_url: Some(banquet_url.to_string()),
            info: Some(QueryInfo::parse(banquet_url)),
            status: QueryStatus::Running,
            started_at: Some(Local::now()),
            started: Some(Instant::now()),
            ..Self::default()
        };
    }

    /// Fold one stream event into the view.
    pub fn apply(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Header { columns, total } => {
                self.columns = columns;
                self.advertised_total = Some(total);
            }
            StreamEvent::Rows(mut rows) => {
                self.batches += 1;
                self.rows.append(&mut rows);
            }
            StreamEvent::Error(message) => {
                self.errors.push(message);
            }
            StreamEvent::Complete { total_rows } => {
                self.status = QueryStatus::Completed { total_rows };
                self.stop_clock();
            }
        }
    }

    /// Record the table schema looked up alongside the query.
    pub fn apply_schema(&mut self, schema: Vec<ColumnInfo>) {
        self.schema = schema;
    }

    /// The query task ended without a completion event.
    ///
    /// The last reported error is the stream-level failure.
    pub fn mark_failed(&mut self) {
        if !self.status.is_running() {
            return;
        }
        let message = self
            .errors
            .last()
            .cloned()
            .unwrap_or_else(|| "Query ended unexpectedly".to_string());
        self.status = QueryStatus::Failed(message);
        self.stop_clock();
    }

    pub fn mark_cancelled(&mut self) {
        if !self.status.is_running() {
            return;
        }
        self.status = QueryStatus::Cancelled;
        self.stop_clock();
    }

    fn stop_clock(&mut self) {
        self.elapsed = self.started.map(|s| s.elapsed());
    }

    /// Time since the query started, frozen once it ends.
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed.or_else(|| self.started.map(|s| s.elapsed()))
    }

    fn known_columns(&self) -> &[ColumnInfo] {
        if self.columns.is_empty() {
            &self.schema
        } else {
            &self.columns
        }
    }

    /// Number of columns to render: the header's, the looked-up schema's,
    /// or the widest row seen.
    pub fn column_count(&self) -> usize {
        let widest = self.rows.iter().map(|r| r.len()).max().unwrap_or(0);
        self.known_columns().len().max(widest)
    }

    /// Name of column `index`, when the header or schema gives one.
    pub fn column_name(&self, index: usize) -> Option<&str> {
        self.known_columns().get(index).map(|c| c.name.as_str())
    }

    /// Query summary: dataset, table, query string, column count,
    /// advertised total and wall-clock start.
    pub fn summary_line(&self) -> Option<String> {
        let info = self.info.as_ref()?;
        let mut parts = vec![info.dataset_path.clone(), format!("table {}", info.table)];
        if let Some(query) = &info.query {
            parts.push(format!("?{}", query));
        }
        let columns = self.known_columns().len();
        if columns > 0 {
            parts.push(format!("{} columns", columns));
        }
        if let Some(total) = self.advertised_total {
            parts.push(format!("total {}", total));
        }
        if let Some(started_at) = self.started_at {
            parts.push(format!("started {}", started_at.format("%H:%M:%S")));
        }
        Some(parts.join(" | "))
    }

    /// Status bar text.
    pub fn status_line(&self) -> String {
        let loaded = self.rows.len();
        let elapsed = self
            .elapsed()
            .map(|d| format!(" in {:.1}s", d.as_secs_f64()))
            .unwrap_or_default();

        match &self.status {
            QueryStatus::Idle => "Ready".to_string(),
            QueryStatus::Running => match self.advertised_total {
                Some(total) => format!("Streaming... {} of {} rows", loaded, total),
                None => format!("Executing query (streaming)... {} rows", loaded),
            },
            QueryStatus::Completed { total_rows } => match self.errors.last() {
                Some(last) => format!(
                    "Done! Loaded {} rows{} with {} error(s): {}",
                    total_rows,
                    elapsed,
                    self.errors.len(),
                    last
                ),
                None => format!("Done! Loaded {} rows{}", total_rows, elapsed),
            },
            QueryStatus::Failed(message) => {
                format!("Error: {} ({} rows loaded)", message, loaded)
            }
            QueryStatus::Cancelled => format!("Cancelled after {} rows{}", loaded, elapsed),
        }
    }

    // ===== Scrolling =====

    fn max_scroll(&self) -> usize {
        self.rows.len().saturating_sub(1)
    }

    pub fn scroll_up(&mut self, n: usize) {
        self.scroll = self.scroll.saturating_sub(n);
    }

    pub fn scroll_down(&mut self, n: usize) {
        self.scroll = (self.scroll + n).min(self.max_scroll());
    }

    pub fn scroll_top(&mut self) {
        self.scroll = 0;
    }

    pub fn scroll_bottom(&mut self) {
        self.scroll = self.max_scroll();
    }

    /// Rows visible from the current scroll offset.
    pub fn visible_rows(&self, height: usize) -> &[Row] {
        let start = self.scroll.min(self.rows.len());
        let end = (start + height).min(self.rows.len());
        &self.rows[start..end]
    }
}
