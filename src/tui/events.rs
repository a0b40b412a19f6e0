//! Custom event types for TUI application.

use crossterm::event::KeyEvent;

/// Terminal input forwarded from the blocking input thread
#[derive(Debug)]
pub enum TuiEvent {
    /// User keyboard input
    Key(KeyEvent),
    /// Bracketed paste content
    Paste(String),
    /// Terminal was resized
    Resize,
}
