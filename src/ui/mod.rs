//! UI rendering module.
//!
//! This module contains all the rendering logic for the TUI.

mod footer;
mod header;
mod results;

use ratatui::prelude::*;

use crate::app::App;

/// Main render function - called every frame.
pub fn render(frame: &mut Frame, app: &mut App) {
    // Main layout: Query bar, Results, Footer
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Query bar
            Constraint::Min(0),    // Results
            Constraint::Length(3), // Footer
        ])
        .split(frame.area());

    header::render(frame, app, chunks[0]);
    results::render(frame, app, chunks[1]);
    footer::render(frame, app, chunks[2]);
}
