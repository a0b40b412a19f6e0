//! UI layout and rendering logic for the TUI.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use super::app::{App, PopupState};
use crate::{printer::severity_of, protocol::MessageKind, utils::unicode::display_width_to};

/// Render the main UI
pub fn render_ui(frame: &mut Frame, app: &mut App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(55), // Editor
            Constraint::Min(3),         // Output
            Constraint::Length(1),      // Status bar
        ])
        .split(frame.area());

    render_editor(frame, app, main_layout[0]);
    render_output(frame, app, main_layout[1]);
    render_status_bar(frame, app, main_layout[2]);

    match &app.popup_state {
        PopupState::Help => render_help_overlay(frame),
        PopupState::SaveTitle { title } => render_save_prompt(frame, title),
        PopupState::Snippets { selected } => render_snippets(frame, app, *selected),
        PopupState::None => {}
    }
}

fn render_editor(frame: &mut Frame, app: &mut App, area: Rect) {
    let height = area.height.saturating_sub(2) as usize;
    app.editor.scroll_into_view(height);

    let lines: Vec<Line> = app
        .editor
        .lines()
        .iter()
        .skip(app.editor.scroll)
        .take(height)
        .map(|line| Line::from(line.as_str()))
        .collect();

    let title = format!(" {} (F2 to switch) ", app.language.label());
    let paragraph = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(paragraph, area);

    if !app.is_popup_shown() {
        let (row, col) = app.editor.cursor();
        let line = &app.editor.lines()[row];
        let offset = display_width_to(line, col);
        if let Some(position) = cursor_position(area, offset, row.saturating_sub(app.editor.scroll)) {
            frame.set_cursor_position(position);
        }
    }
}

/// Terminal cell for a cursor `offset` columns into the `row`-th visible
/// line of a bordered `area`, or `None` when it falls outside the inner area.
fn cursor_position(area: Rect, offset: usize, row: usize) -> Option<(u16, u16)> {
    let inner_width = usize::from(area.width.saturating_sub(2));
    let inner_height = usize::from(area.height.saturating_sub(2));
    if offset >= inner_width || row >= inner_height {
        return None;
    }
    // Both fit in the area, so they fit in u16.
    Some((area.x + 1 + offset as u16, area.y + 1 + row as u16))
}

fn render_output(frame: &mut Frame, app: &App, area: Rect) {
    let sink = app.controller.sink();
    let height = area.height.saturating_sub(2) as usize;
    let first = sink.first_visible(height);

    let lines: Vec<Line> = sink
        .lines()
        .iter()
        .skip(first)
        .take(height)
        .map(|line| Line::from(Span::styled(line.as_str(), line_style(line))))
        .collect();

    let title = if app.controller.is_running() {
        " Output (running) "
    } else {
        " Output "
    };
    let paragraph = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(paragraph, area);
}

fn line_style(line: &str) -> Style {
    match severity_of(line) {
        MessageKind::Error => Style::default().fg(Color::Red),
        MessageKind::Warn => Style::default().fg(Color::Yellow),
        MessageKind::Info => Style::default().fg(Color::Cyan),
        MessageKind::Log => Style::default(),
    }
}

/// Render the status bar
fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let enabled = Style::default().bg(Color::DarkGray).fg(Color::White).add_modifier(Modifier::BOLD);
    let disabled = Style::default().bg(Color::DarkGray).fg(Color::Gray).add_modifier(Modifier::DIM);
    let plain = Style::default().bg(Color::DarkGray).fg(Color::White);

    let run_style = if app.controller.can_run() { enabled } else { disabled };
    let stop_style = if app.controller.can_stop() { enabled } else { disabled };

    let status = Line::from(vec![
        Span::styled(" [Run F5] ", run_style),
        Span::styled("[Stop F6] ", stop_style),
        Span::styled(format!("| {} | {} ", app.engine_label(), app.status_message), plain),
    ]);

    let status_paragraph = Paragraph::new(status).style(plain);
    frame.render_widget(status_paragraph, area);
}

/// Render help overlay
fn render_help_overlay(frame: &mut Frame) {
    let popup_area = centered_rect(70, 70, frame.area());
    frame.render_widget(Clear, popup_area);

    let help_lines = vec![
        Line::from("Snippet Playground"),
        Line::from(""),
        Line::from("  F5 / Ctrl+R   - Run the editor contents"),
        Line::from("  F6 / Esc      - Stop the running snippet"),
        Line::from("  F2            - Switch JavaScript / Python"),
        Line::from("  Ctrl+S        - Save snippet"),
        Line::from("  Ctrl+O        - Open saved snippets (Enter load, Del delete)"),
        Line::from("  Ctrl+D        - Download as snippet.js / snippet.py"),
        Line::from("  Ctrl+L        - Clear output"),
        Line::from("  PgUp / PgDn   - Scroll output"),
        Line::from("  Ctrl+Q        - Quit (or Ctrl+C twice)"),
        Line::from(""),
        Line::from("JavaScript runs stop after the time limit."),
        Line::from("Stopping Python only releases the controls."),
        Line::from(""),
        Line::from("Press any key to close"),
    ];

    let help = Paragraph::new(help_lines)
        .block(Block::default().borders(Borders::ALL).title(" Help "))
        .wrap(Wrap { trim: false });
    frame.render_widget(help, popup_area);
}

fn render_save_prompt(frame: &mut Frame, title: &str) {
    let popup_area = centered_rect(50, 20, frame.area());
    frame.render_widget(Clear, popup_area);
    let prompt = Paragraph::new(vec![
        Line::from(format!("{title}_")),
        Line::from(""),
        Line::from(Span::styled("Enter to save, Esc to cancel", Style::default().fg(Color::Gray))),
    ])
    .block(Block::default().borders(Borders::ALL).title(" Snippet title "));
    frame.render_widget(prompt, popup_area);
}

fn render_snippets(frame: &mut Frame, app: &App, selected: usize) {
    let popup_area = centered_rect(70, 60, frame.area());
    frame.render_widget(Clear, popup_area);

    let lines: Vec<Line> = if app.snippets.is_empty() {
        vec![Line::from("No saved snippets")]
    } else {
        app.snippets
            .iter()
            .enumerate()
            .map(|(i, snippet)| {
                let text = format!(
                    "{:<12} {}  ({})",
                    snippet.language.label(),
                    snippet.title,
                    snippet.created_at.format("%Y-%m-%d %H:%M")
                );
                let style = if i == selected {
                    Style::default().fg(Color::Black).bg(Color::Cyan)
                } else {
                    Style::default()
                };
                Line::from(Span::styled(text, style))
            })
            .collect()
    };

    let height = popup_area.height.saturating_sub(2) as usize;
    let offset = selected.saturating_sub(height.saturating_sub(1)) as u16;
    let list = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Snippets (Enter load, Del delete, Esc close) "),
        )
        .scroll((offset, 0));
    frame.render_widget(list, popup_area);
}

/// Helper function to create a centered rectangle
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
