//! Output sink: the text surface captured output is rendered into.

/// Line-oriented output buffer with follow-the-tail scrolling.
#[derive(Debug, Clone, Default)]
pub struct OutputSink {
    lines: Vec<String>,
    /// Lines scrolled up from the bottom; 0 keeps the newest line visible.
    scroll_offset: usize,
    /// Bumped on every `reset` so streaming readers can detect a rewrite.
    epoch: u64,
}

impl OutputSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the displayed content wholesale.
    pub fn reset(&mut self, text: &str) {
        self.lines = if text.is_empty() {
            Vec::new()
        } else {
            text.lines().map(str::to_string).collect()
        };
        self.epoch += 1;
        self.scroll_to_bottom();
    }

    /// Add one line and scroll so it is visible.
    pub fn append(&mut self, line: impl Into<String>) {
        let line = line.into();
        // A message may itself span lines (stack traces); keep one entry per row.
        if line.contains('\n') {
            self.lines.extend(line.lines().map(str::to_string));
        } else {
            self.lines.push(line);
        }
        self.scroll_to_bottom();
    }

    pub fn clear(&mut self) {
        self.reset("");
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn text(&self) -> String {
        let mut text = self.lines.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        text
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    pub fn scroll_up(&mut self, by: usize) {
        let max = self.lines.len().saturating_sub(1);
        self.scroll_offset = (self.scroll_offset + by).min(max);
    }

    pub fn scroll_down(&mut self, by: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(by);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_offset = 0;
    }

    /// First line to draw for a viewport of `height` rows.
    pub fn first_visible(&self, height: usize) -> usize {
        let max_top = self.lines.len().saturating_sub(height);
        max_top.saturating_sub(self.scroll_offset.min(max_top))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_order() {
        let mut sink = OutputSink::new();
        for i in 0..5 {
            sink.append(format!("line {i}"));
        }
        assert_eq!(sink.lines(), ["line 0", "line 1", "line 2", "line 3", "line 4"]);
    }

    #[test]
    fn test_reset_replaces_and_bumps_epoch() {
        let mut sink = OutputSink::new();
        sink.append("old");
        let before = sink.epoch();
        sink.reset("hi\nthere\n");
        assert_eq!(sink.lines(), ["hi", "there"]);
        assert_eq!(sink.text(), "hi\nthere\n");
        assert_eq!(sink.epoch(), before + 1);

        sink.reset("");
        assert!(sink.is_empty());
        assert_eq!(sink.text(), "");
    }

    #[test]
    fn test_multiline_append_splits_rows() {
        let mut sink = OutputSink::new();
        sink.append("[Error] Error: boom\n    at snippet.js:1:7");
        assert_eq!(sink.lines().len(), 2);
    }

    #[test]
    fn test_append_scrolls_to_bottom() {
        let mut sink = OutputSink::new();
        for i in 0..20 {
            sink.append(i.to_string());
        }
        sink.scroll_up(5);
        assert_eq!(sink.first_visible(10), 5);
        sink.append("new");
        assert_eq!(sink.scroll_offset(), 0);
        assert_eq!(sink.first_visible(10), 11);
    }

    #[test]
    fn test_scroll_is_clamped() {
        let mut sink = OutputSink::new();
        sink.append("only");
        sink.scroll_up(100);
        assert_eq!(sink.scroll_offset(), 0);
        assert_eq!(sink.first_visible(5), 0);
    }
}
