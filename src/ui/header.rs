//! Query bar with the Banquet URL input.

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders};

use crate::app::App;

pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let border_color = if app.results.status.is_running() {
        Color::Yellow
    } else {
        Color::Cyan
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Banquet URL ")
        .title_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .title_bottom(Line::from(format!(" {} ", app.server_label())).right_aligned());

    let inner = block.inner(area);
    frame.render_widget(block, area);
    frame.render_widget(&app.query_input, inner);
}
