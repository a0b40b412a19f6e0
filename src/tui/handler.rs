//! Async event loop for the TUI playground.

use std::io;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use tokio::sync::mpsc;

use crate::controller::ControllerEvent;

use super::{
    app::{App, PopupState},
    events::TuiEvent,
    ui::render_ui,
};

/// Run the interactive playground until the user quits.
pub async fn run_tui(mut app: App, controller_rx: mpsc::UnboundedReceiver<ControllerEvent>) -> Result<()> {
    // Check if we're in a proper terminal environment
    if !io::IsTerminal::is_terminal(&io::stdout()) {
        return Err(anyhow::anyhow!("TUI mode requires a proper terminal environment"));
    }

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    stdout.execute(EnterAlternateScreen)?;
    stdout.execute(EnableBracketedPaste)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut app, controller_rx).await;

    // Tear down whatever is still running before leaving.
    app.controller.release();

    // Restore terminal
    disable_raw_mode()?;
    terminal.backend_mut().execute(DisableBracketedPaste)?;
    terminal.backend_mut().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

/// Main application loop
async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    mut controller_rx: mpsc::UnboundedReceiver<ControllerEvent>,
) -> Result<()> {
    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<TuiEvent>();
    let shutdown = Arc::new(AtomicBool::new(false));

    // Spawn input handler
    let input_shutdown = Arc::clone(&shutdown);
    tokio::task::spawn_blocking(move || {
        while !input_shutdown.load(Ordering::Relaxed) {
            // Poll for keyboard events
            if !event::poll(Duration::from_millis(100)).unwrap_or(false) {
                continue;
            }
            let forwarded = match event::read() {
                Ok(Event::Key(key)) if key.kind != KeyEventKind::Release => TuiEvent::Key(key),
                Ok(Event::Paste(text)) => TuiEvent::Paste(text),
                Ok(Event::Resize(..)) => TuiEvent::Resize,
                _ => continue,
            };
            if input_tx.send(forwarded).is_err() {
                break; // Channel closed
            }
        }
    });

    // Redraw periodically so engine status changes show up.
    let mut tick = tokio::time::interval(Duration::from_millis(250));

    let outcome = loop {
        if let Err(err) = terminal.draw(|frame| render_ui(frame, app)) {
            break Err(err).context("failed to draw the playground");
        }

        tokio::select! {
            Some(event) = controller_rx.recv() => app.controller.handle_event(event),
            input = input_rx.recv() => match input {
                Some(TuiEvent::Key(key)) => {
                    if handle_key_event(app, key) {
                        break Ok(());
                    }
                }
                Some(TuiEvent::Paste(text)) => handle_paste(app, &text),
                Some(TuiEvent::Resize) => {}
                None => break Ok(()),
            },
            _ = tick.tick() => {}
        }
    };

    shutdown.store(true, Ordering::Relaxed);
    outcome
}

fn handle_paste(app: &mut App, text: &str) {
    match &mut app.popup_state {
        PopupState::SaveTitle { title } => title.push_str(text.lines().next().unwrap_or("")),
        PopupState::None => app.editor.insert_str(text),
        _ => {}
    }
}

/// Handle keyboard events. Returns true when the user asked to quit.
fn handle_key_event(app: &mut App, key: KeyEvent) -> bool {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    if ctrl && key.code == KeyCode::Char('c') {
        return app.handle_ctrl_c();
    }
    if ctrl && key.code == KeyCode::Char('q') {
        return true;
    }

    if app.is_popup_shown() {
        handle_popup_key(app, key);
        return false;
    }

    match key.code {
        KeyCode::F(1) => app.toggle_help(),
        KeyCode::F(2) => app.toggle_language(),
        KeyCode::F(5) => app.run_current(),
        KeyCode::Char('r') if ctrl => app.run_current(),
        KeyCode::F(6) | KeyCode::Esc => app.stop(),
        KeyCode::Char('s') if ctrl => app.open_save_prompt(),
        KeyCode::Char('o') if ctrl => app.open_snippets(),
        KeyCode::Char('d') if ctrl => app.download(),
        KeyCode::Char('l') if ctrl => app.clear_output(),
        KeyCode::PageUp => app.controller.sink_mut().scroll_up(5),
        KeyCode::PageDown => app.controller.sink_mut().scroll_down(5),
        KeyCode::Enter => app.editor.newline(),
        KeyCode::Tab => app.editor.insert_tab(),
        KeyCode::Backspace => app.editor.backspace(),
        KeyCode::Delete => app.editor.delete(),
        KeyCode::Left => app.editor.move_left(),
        KeyCode::Right => app.editor.move_right(),
        KeyCode::Up => app.editor.move_up(),
        KeyCode::Down => app.editor.move_down(),
        KeyCode::Home => app.editor.move_home(),
        KeyCode::End => app.editor.move_end(),
        KeyCode::Char(c) if !ctrl => app.editor.insert_char(c),
        _ => {}
    }
    false
}

fn handle_popup_key(app: &mut App, key: KeyEvent) {
    match &mut app.popup_state {
        PopupState::Help => app.hide_popup(),
        PopupState::SaveTitle { title } => match key.code {
            KeyCode::Esc => app.hide_popup(),
            KeyCode::Enter => {
                let title = std::mem::take(title);
                app.hide_popup();
                app.save_snippet(&title);
            }
            KeyCode::Backspace => {
                title.pop();
            }
            KeyCode::Char(c) => title.push(c),
            _ => {}
        },
        PopupState::Snippets { selected } => {
            let count = app.snippets.len();
            match key.code {
                KeyCode::Esc => app.hide_popup(),
                KeyCode::Up => *selected = selected.saturating_sub(1),
                KeyCode::Down if *selected + 1 < count => *selected += 1,
                KeyCode::Enter => {
                    let index = *selected;
                    app.hide_popup();
                    app.load_snippet(index);
                }
                KeyCode::Delete => {
                    let index = *selected;
                    app.delete_snippet(index);
                    if let PopupState::Snippets { selected } = &mut app.popup_state {
                        *selected = (*selected).min(app.snippets.len().saturating_sub(1));
                    }
                }
                _ => {}
            }
        }
        PopupState::None => {}
    }
}
