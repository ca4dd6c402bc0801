//! Streamed results table.

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, Wrap};
use unicode_truncate::UnicodeTruncateStr;

use crate::app::{App, QueryStatus};

/// Widest a single cell is allowed to render.
const MAX_CELL_WIDTH: usize = 40;

pub fn render(frame: &mut Frame, app: &mut App, area: Rect) {
    let title = build_title(app);
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .title_style(Style::default().fg(Color::Cyan));

    // Header row takes one line plus its margin.
    let body_height = area.height.saturating_sub(4) as usize;
    app.page_size = body_height.max(1);

    let results = &app.results;
    let column_count = results.column_count();

    if column_count == 0 {
        let message = match &results.status {
            QueryStatus::Idle => "Type a Banquet URL and press Enter...",
            QueryStatus::Running => "Waiting for results...",
            _ => "No rows.",
        };
        let mut lines = vec![Line::styled(message, Style::default().fg(Color::DarkGray))];
        for error in &results.errors {
            lines.push(Line::styled(
                format!("X {}", error),
                Style::default().fg(Color::Red),
            ));
        }
        let paragraph = Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
        return;
    }

    let header_cells: Vec<Cell> = (0..column_count)
        .map(|i| {
            let name = results
                .column_name(i)
                .map(str::to_string)
                .unwrap_or_else(|| format!("col {}", i + 1));
            Cell::from(name).style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
        })
        .collect();
    let header = Row::new(header_cells).height(1).bottom_margin(1);

    let rows: Vec<Row> = results
        .visible_rows(body_height)
        .iter()
        .map(|row| {
            let cells: Vec<Cell> = (0..column_count)
                .map(|i| match row.get(i) {
                    Some(cell) if cell.is_null() => {
                        Cell::from("NULL").style(Style::default().fg(Color::DarkGray))
                    }
                    Some(cell) => Cell::from(
                        Text::from(clip(&cell.to_string())).alignment(cell_alignment(cell)),
                    ),
                    None => Cell::from(""),
                })
                .collect();
            Row::new(cells)
        })
        .collect();

    let widths = vec![Constraint::Fill(1); column_count];

    let table = Table::new(rows, widths).header(header).block(block);
    frame.render_widget(table, area);
}

fn build_title(app: &App) -> String {
    let results = &app.results;
    let table = results
        .info
        .as_ref()
        .map(|info| format!(" {} ", info.table))
        .unwrap_or_default();

    let position = if results.rows.is_empty() {
        String::new()
    } else {
        format!("[{}/{}] ", results.scroll + 1, results.rows.len())
    };

    format!(" Results{}{}", table, position)
}

fn cell_alignment(cell: &banquet_tui::models::Cell) -> Alignment {
    if cell.is_numeric() {
        Alignment::Right
    } else {
        Alignment::Left
    }
}

/// Clip a cell's text to one line of bounded display width.
fn clip(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default();
    let (clipped, _) = line.unicode_truncate(MAX_CELL_WIDTH);
    if clipped.len() == text.len() {
        return clipped.to_string();
    }
    let (shorter, _) = line.unicode_truncate(MAX_CELL_WIDTH - 1);
    format!("{}…", shorter)
}
