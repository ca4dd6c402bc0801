//! Action types for MVU/Reducer pattern.
//!
//! All state mutations should be triggered via `App::update(action)` to make
//! transitions explicit and testable.

/// Actions that can modify application state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    // ===== Query =====
    /// Run the query currently in the input bar.
    QueryRun,
    /// Cancel the running query.
    QueryCancel,

    // ===== Results Table =====
    /// Scroll results up by one row.
    ResultsScrollUp,
    /// Scroll results down by one row.
    ResultsScrollDown,
    /// Scroll results up by one page.
    ResultsPageUp,
    /// Scroll results down by one page.
    ResultsPageDown,
    /// Jump to the first row.
    ResultsTop,
    /// Jump to the last row.
    ResultsBottom,

    // ===== General =====
    /// Clear the current error message.
    ErrorClear,
    /// Request application quit.
    Quit,
}
