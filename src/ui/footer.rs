//! Footer bar with query summary, status and keybindings.

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::app::{App, QueryStatus, ResultsState};

/// Key chips, matching the bindings in the event loop.
fn keybindings(running: bool) -> Vec<(&'static str, &'static str)> {
    if running {
        vec![
            ("Esc", "Cancel"),
            ("↑/↓ Ctrl+J/K", "Scroll"),
            ("Ctrl+Q", "Quit"),
        ]
    } else {
        vec![
            ("Enter", "Run"),
            ("↑/↓ Ctrl+J/K", "Scroll"),
            ("PgUp/Dn", "Page"),
            ("Ctrl+Home/End", "Top/Bottom"),
            ("Ctrl+Q", "Quit"),
        ]
    }
}

fn status_color(results: &ResultsState) -> Color {
    match results.status {
        QueryStatus::Idle => Color::DarkGray,
        QueryStatus::Running => Color::Yellow,
        QueryStatus::Completed { .. } if !results.errors.is_empty() => Color::Yellow,
        QueryStatus::Completed { .. } => Color::Green,
        QueryStatus::Failed(_) => Color::Red,
        QueryStatus::Cancelled => Color::Magenta,
    }
}

pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let results = &app.results;
    let (status_text, status_color) = match &app.last_error {
        Some(error) => (error.clone(), Color::Red),
        None => (results.status_line(), status_color(results)),
    };

    let mut spans = vec![
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw("  "),
    ];
    // Completed status lines already name their errors.
    let completed = matches!(results.status, QueryStatus::Completed { .. });
    if !results.errors.is_empty() && app.last_error.is_none() && !completed {
        spans.push(Span::styled(
            format!("({} errors) ", results.errors.len()),
            Style::default().fg(Color::Red),
        ));
    }
    let keys = keybindings(results.status.is_running());
    spans.extend(keys.iter().flat_map(|(key, action)| {
        vec![
            Span::styled(
                format!(" {} ", key),
                Style::default().bg(Color::DarkGray).fg(Color::White),
            ),
            Span::raw(format!(" {} ", action)),
            Span::raw(" "),
        ]
    }));

    let mut block = Block::default().borders(Borders::ALL);
    if let Some(summary) = results.summary_line() {
        block = block
            .title(format!(" {} ", summary))
            .title_style(Style::default().fg(Color::Cyan));
    }

    let paragraph = Paragraph::new(Line::from(spans))
        .block(block)
        .alignment(Alignment::Left);

    frame.render_widget(paragraph, area);
}
