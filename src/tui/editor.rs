//! Multi-line source buffer backing the editor pane.

use crate::utils::unicode::char_to_byte_index;

const TAB: &str = "    ";

#[derive(Debug, Clone)]
pub struct Editor {
    lines: Vec<String>,
    /// Cursor row.
    row: usize,
    /// Cursor column, in characters.
    col: usize,
    /// First visible row.
    pub scroll: usize,
}

impl Default for Editor {
    fn default() -> Self {
        Self {
            lines: vec![String::new()],
            row: 0,
            col: 0,
            scroll: 0,
        }
    }
}

impl Editor {
    pub fn from_text(text: &str) -> Self {
        let mut editor = Self::default();
        editor.set_text(text);
        editor
    }

    pub fn set_text(&mut self, text: &str) {
        self.lines = text.lines().map(str::to_string).collect();
        if text.ends_with('\n') || self.lines.is_empty() {
            self.lines.push(String::new());
        }
        self.row = 0;
        self.col = 0;
        self.scroll = 0;
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn cursor(&self) -> (usize, usize) {
        (self.row, self.col)
    }

    fn line_chars(&self) -> usize {
        self.lines[self.row].chars().count()
    }

    pub fn insert_char(&mut self, c: char) {
        if c == '\n' {
            self.newline();
            return;
        }
        let line = &mut self.lines[self.row];
        let at = char_to_byte_index(line, self.col);
        line.insert(at, c);
        self.col += 1;
    }

    pub fn insert_str(&mut self, text: &str) {
        for c in text.replace("\r\n", "\n").replace('\t', TAB).chars() {
            if c != '\r' {
                self.insert_char(c);
            }
        }
    }

    pub fn insert_tab(&mut self) {
        self.insert_str(TAB);
    }

    pub fn newline(&mut self) {
        let line = &mut self.lines[self.row];
        let at = char_to_byte_index(line, self.col);
        let rest = line.split_off(at);
        self.lines.insert(self.row + 1, rest);
        self.row += 1;
        self.col = 0;
    }

    pub fn backspace(&mut self) {
        if self.col > 0 {
            let line = &mut self.lines[self.row];
            let at = char_to_byte_index(line, self.col - 1);
            line.remove(at);
            self.col -= 1;
        } else if self.row > 0 {
            // Join with the previous line.
            let current = self.lines.remove(self.row);
            self.row -= 1;
            self.col = self.line_chars();
            self.lines[self.row].push_str(&current);
        }
    }

    pub fn delete(&mut self) {
        if self.col < self.line_chars() {
            let line = &mut self.lines[self.row];
            let at = char_to_byte_index(line, self.col);
            line.remove(at);
        } else if self.row + 1 < self.lines.len() {
            let next = self.lines.remove(self.row + 1);
            self.lines[self.row].push_str(&next);
        }
    }

    pub fn move_left(&mut self) {
        if self.col > 0 {
            self.col -= 1;
        } else if self.row > 0 {
            self.row -= 1;
            self.col = self.line_chars();
        }
    }

    pub fn move_right(&mut self) {
        if self.col < self.line_chars() {
            self.col += 1;
        } else if self.row + 1 < self.lines.len() {
            self.row += 1;
            self.col = 0;
        }
    }

    pub fn move_up(&mut self) {
        if self.row > 0 {
            self.row -= 1;
            self.col = self.col.min(self.line_chars());
        }
    }

    pub fn move_down(&mut self) {
        if self.row + 1 < self.lines.len() {
            self.row += 1;
            self.col = self.col.min(self.line_chars());
        }
    }

    pub fn move_home(&mut self) {
        self.col = 0;
    }

    pub fn move_end(&mut self) {
        self.col = self.line_chars();
    }

    /// Adjust `scroll` so the cursor row is inside a viewport of `height` rows.
    pub fn scroll_into_view(&mut self, height: usize) {
        if height == 0 {
            return;
        }
        if self.row < self.scroll {
            self.scroll = self.row;
        } else if self.row >= self.scroll + height {
            self.scroll = self.row + 1 - height;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typing_and_newlines() {
        let mut editor = Editor::default();
        editor.insert_str("print('a')\nprint('b')");
        assert_eq!(editor.text(), "print('a')\nprint('b')");
        assert_eq!(editor.cursor(), (1, 10));
    }

    #[test]
    fn test_backspace_joins_lines() {
        let mut editor = Editor::from_text("ab\ncd");
        editor.move_down();
        editor.move_home();
        editor.backspace();
        assert_eq!(editor.text(), "abcd");
        assert_eq!(editor.cursor(), (0, 2));
    }

    #[test]
    fn test_delete_at_end_joins_next_line() {
        let mut editor = Editor::from_text("ab\ncd");
        editor.move_end();
        editor.delete();
        assert_eq!(editor.text(), "abcd");
    }

    #[test]
    fn test_multibyte_editing() {
        let mut editor = Editor::from_text("héllo");
        editor.move_right();
        editor.move_right();
        editor.backspace();
        assert_eq!(editor.text(), "hllo");
        editor.insert_char('é');
        assert_eq!(editor.text(), "héllo");
    }

    #[test]
    fn test_paste_normalizes_tabs_and_crlf() {
        let mut editor = Editor::default();
        editor.insert_str("if x:\r\n\tpass");
        assert_eq!(editor.text(), "if x:\n    pass");
    }

    #[test]
    fn test_scroll_into_view() {
        let mut editor = Editor::from_text(&"x\n".repeat(30));
        for _ in 0..20 {
            editor.move_down();
        }
        editor.scroll_into_view(10);
        assert_eq!(editor.scroll, 11);
        for _ in 0..20 {
            editor.move_up();
        }
        editor.scroll_into_view(10);
        assert_eq!(editor.scroll, 0);
    }

    #[test]
    fn test_set_text_trailing_newline() {
        let editor = Editor::from_text("a\n");
        assert_eq!(editor.lines().len(), 2);
        assert_eq!(editor.text(), "a\n");
    }
}
