//! Application state management.
//!
//! This module contains the central `App` struct that holds all application
//! state, starts and cancels queries, and folds streamed events into the
//! results view.

use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use tui_textarea::TextArea;

use banquet_tui::client::{QueryClient, QueryHandle};
use banquet_tui::models::{ColumnInfo, QueryInfo};
use banquet_tui::stream::QueryUpdate;

pub use crate::state::{Action, QueryStatus, ResultsState};

/// Placeholder shown in the empty query bar.
const QUERY_PLACEHOLDER: &str = "Index.sqlite/tb0?limit=100";

/// How long a non-fatal error stays in the status bar.
const ERROR_DISPLAY_DURATION: Duration = Duration::from_secs(5);

/// Main application state.
pub struct App<'a> {
    /// Flag to exit the application.
    pub should_quit: bool,

    /// Banquet URL input bar.
    pub query_input: TextArea<'a>,

    /// Streamed results of the current query.
    pub results: ResultsState,

    /// Last non-fatal error message (displayed in status bar, auto-clears).
    pub last_error: Option<String>,

    /// Timestamp when last_error was set.
    last_error_time: Option<Instant>,

    /// Dirty flag - set when UI needs to be redrawn.
    needs_redraw: bool,

    /// Rows per page, updated by the renderer from the table height.
    pub page_size: usize,

    client: QueryClient,
    runtime: Handle,

    /// Channel carrying events from query tasks to the UI thread.
    update_tx: Sender<QueryUpdate>,
    update_rx: Receiver<QueryUpdate>,

    /// Monotonically increasing counter for query IDs.
    /// Updates tagged with any other ID are stale and ignored.
    next_query_id: usize,

    /// The query currently streaming, if any.
    active_query: Option<QueryHandle>,

    /// Result of the startup health check, once known.
    pub server_online: Option<bool>,
    health_rx: Option<Receiver<Result<(), String>>>,

    /// Table schema lookup for the current query. Replaced on every start.
    schema_rx: Option<Receiver<Result<Vec<ColumnInfo>, String>>>,
}

impl<'a> App<'a> {
    pub fn new(client: QueryClient, runtime: Handle) -> Self {
        let (update_tx, update_rx) = mpsc::channel();

        let mut query_input = TextArea::default();
        query_input.set_placeholder_text(QUERY_PLACEHOLDER);

        Self {
            should_quit: false,
            query_input,
            results: ResultsState::default(),
            last_error: None,
            last_error_time: None,
            needs_redraw: true,
            page_size: 20,
            client,
            runtime,
            update_tx,
            update_rx,
            next_query_id: 1,
            active_query: None,
            server_online: None,
            health_rx: None,
            schema_rx: None,
        }
    }

    // ===== Dirty Flag (Rendering Optimization) =====

    /// Mark UI as needing redraw.
    pub fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    /// Check if redraw is needed and reset the flag.
    pub fn take_needs_redraw(&mut self) -> bool {
        std::mem::take(&mut self.needs_redraw)
    }

    // ===== Error Handling =====

    /// Set a non-fatal error to display in the UI.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
        self.last_error_time = Some(Instant::now());
        self.mark_dirty();
    }

    /// Clear the current error.
    pub fn clear_error(&mut self) {
        if self.last_error.is_some() {
            self.last_error = None;
            self.last_error_time = None;
            self.mark_dirty();
        }
    }

    /// Clear the error once it has been shown long enough.
    pub fn maybe_clear_error(&mut self) {
        if let Some(error_time) = self.last_error_time {
            if error_time.elapsed() > ERROR_DISPLAY_DURATION {
                self.clear_error();
            }
        }
    }

    // ===== MVU/Reducer: Centralized State Update =====

    /// Process an action and update application state.
    pub fn update(&mut self, action: Action) {
        match action {
            Action::QueryRun => self.run_query_from_input(),
            Action::QueryCancel => self.cancel_query(),

            Action::ResultsScrollUp => self.results.scroll_up(1),
            Action::ResultsScrollDown => self.results.scroll_down(1),
            Action::ResultsPageUp => self.results.scroll_up(self.page_size),
            Action::ResultsPageDown => self.results.scroll_down(self.page_size),
            Action::ResultsTop => self.results.scroll_top(),
            Action::ResultsBottom => self.results.scroll_bottom(),

            Action::ErrorClear => self.clear_error(),
            Action::Quit => self.should_quit = true,
        }
        self.mark_dirty();
    }

    // ===== Queries =====

    /// Current contents of the query bar.
    pub fn query_text(&self) -> String {
        self.query_input.lines().join("").trim().to_string()
    }

    /// Replace the query bar contents.
    pub fn set_query_text(&mut self, text: &str) {
        let mut input = TextArea::from([text.to_string()]);
        input.set_placeholder_text(QUERY_PLACEHOLDER);
        input.move_cursor(tui_textarea::CursorMove::End);
        self.query_input = input;
        self.mark_dirty();
    }

    fn run_query_from_input(&mut self) {
        let banquet_url = self.query_text();
        if banquet_url.is_empty() {
            self.set_error("Enter a Banquet URL");
            return;
        }
        self.start_query(banquet_url);
    }

    /// Start streaming a query, replacing any query still running.
    pub fn start_query(&mut self, banquet_url: String) {
        if let Some(previous) = self.active_query.take() {
            debug!(query_id = previous.query_id(), "Replacing running query");
            previous.cancel();
        }

        let query_id = self.next_query_id;
        self.next_query_id += 1;

        info!(query_id, "Executing query: {}", banquet_url);
        self.results.begin(&banquet_url);
        self.clear_error();
        self.request_schema(&banquet_url);

        let handle = self.client.spawn_query(
            &self.runtime,
            query_id,
            banquet_url,
            self.update_tx.clone(),
        );
        self.active_query = Some(handle);
        self.mark_dirty();
    }

    /// Cancel the running query, if any.
    pub fn cancel_query(&mut self) {
        if let Some(handle) = self.active_query.take() {
            info!(query_id = handle.query_id(), "Cancelling query");
            handle.cancel();
            self.results.mark_cancelled();
            self.mark_dirty();
        }
    }

    /// Server the queries go to, for the query bar.
    pub fn server_label(&self) -> String {
        let state = match self.server_online {
            Some(true) => "online",
            Some(false) => "offline",
            None => "checking",
        };
        format!("{} ({})", self.client.base_url(), state)
    }

    /// Probe the server's health endpoint in the background.
    pub fn check_server(&mut self) {
        let (tx, rx) = mpsc::channel();
        let client = self.client.clone();
        self.runtime.spawn(async move {
            let result = client
                .health()
                .await
                .map_err(|e| banquet_tui::client::error_chain(&e));
            let _ = tx.send(result);
        });
        self.server_online = None;
        self.health_rx = Some(rx);
    }

    /// Pick up the health check result (non-blocking).
    pub fn poll_health(&mut self) {
        let Some(rx) = &self.health_rx else {
            return;
        };
        let result = match rx.try_recv() {
            Ok(result) => result,
            Err(mpsc::TryRecvError::Empty) => return,
            Err(mpsc::TryRecvError::Disconnected) => Err("health check aborted".to_string()),
        };
        self.health_rx = None;
        match result {
            Ok(()) => {
                info!("Server at {} is up", self.client.base_url());
                self.server_online = Some(true);
            }
            Err(e) => {
                warn!("Server at {} is not reachable: {}", self.client.base_url(), e);
                self.server_online = Some(false);
                self.set_error(format!("Server not reachable: {}", e));
            }
        }
        self.mark_dirty();
    }

    /// Look up the queried table's schema in the background, so columns
    /// have names even before (or without) a header record.
    fn request_schema(&mut self, banquet_url: &str) {
        let info = QueryInfo::parse(banquet_url);
        let (tx, rx) = mpsc::channel();
        let client = self.client.clone();
        self.runtime.spawn(async move {
            let result = client
                .fetch_schema(&info.dataset_path, &info.table)
                .await
                .map_err(|e| banquet_tui::client::error_chain(&e));
            let _ = tx.send(result);
        });
        self.schema_rx = Some(rx);
    }

    /// Pick up the schema lookup result (non-blocking).
    ///
    /// A failed lookup is only logged: the header record still names
    /// the columns.
    pub fn poll_schema(&mut self) {
        let Some(rx) = &self.schema_rx else {
            return;
        };
        let result = match rx.try_recv() {
            Ok(result) => result,
            Err(mpsc::TryRecvError::Empty) => return,
            Err(mpsc::TryRecvError::Disconnected) => Err("schema lookup aborted".to_string()),
        };
        self.schema_rx = None;
        match result {
            Ok(columns) => {
                debug!("Schema lookup returned {} columns", columns.len());
                self.results.apply_schema(columns);
                self.mark_dirty();
            }
            Err(e) => debug!("Schema lookup failed: {}", e),
        }
    }

    pub fn is_query_running(&self) -> bool {
        self.active_query.is_some()
    }

    fn active_query_id(&self) -> Option<usize> {
        self.active_query.as_ref().map(|h| h.query_id())
    }

    /// Drain pending query updates (non-blocking).
    ///
    /// Updates from a replaced or cancelled query are dropped. When the
    /// active query's task has ended without completing, it is marked
    /// failed with the last error it reported.
    pub fn poll_query_updates(&mut self) {
        // Sample before draining: if the task had already ended, every
        // update it sent is in the channel now.
        let task_finished = self
            .active_query
            .as_ref()
            .map(|h| h.is_finished())
            .unwrap_or(false);
        let active_id = self.active_query_id();

        while let Ok(update) = self.update_rx.try_recv() {
            if Some(update.query_id) != active_id {
                debug!(query_id = update.query_id, "Ignoring stale query update");
                continue;
            }
            self.results.apply(update.event);
            self.mark_dirty();
        }

        if !self.results.status.is_running() {
            self.active_query = None;
        } else if task_finished {
            warn!("Query task ended without completing");
            self.results.mark_failed();
            if let QueryStatus::Failed(message) = &self.results.status {
                let message = message.clone();
                self.set_error(message);
            }
            self.active_query = None;
            self.mark_dirty();
        }
    }

    /// Keep the status bar clock moving while a query runs.
    pub fn tick(&mut self) {
        if self.results.status.is_running() {
            self.mark_dirty();
        }
    }
}
