//! Printers for captured output on a plain terminal.

use owo_colors::OwoColorize;

use crate::{output::OutputSink, protocol::MessageKind};

/// Recover the severity of a rendered output line from its prefix.
pub fn severity_of(line: &str) -> MessageKind {
    [MessageKind::Error, MessageKind::Warn, MessageKind::Info]
        .into_iter()
        .find(|kind| line.starts_with(kind.prefix()))
        .unwrap_or(MessageKind::Log)
}

pub struct TextPrinter {
    pub color: bool,
}

impl TextPrinter {
    pub fn print(&self, text: &str) {
        if !self.color {
            println!("{}", text);
            return;
        }
        match severity_of(text) {
            MessageKind::Error => println!("{}", text.red()),
            MessageKind::Warn => println!("{}", text.yellow()),
            MessageKind::Info => println!("{}", text.cyan()),
            MessageKind::Log => println!("{}", text),
        }
    }

    pub fn notice(&self, text: &str) {
        if self.color {
            eprintln!("{}", text.magenta());
        } else {
            eprintln!("{}", text);
        }
    }
}

/// Streams an [`OutputSink`] to the terminal as it grows.
///
/// A reset of the sink is printed in full; appends print only the new lines.
pub struct SinkFollower {
    printer: TextPrinter,
    epoch: u64,
    printed: usize,
}

impl SinkFollower {
    pub fn new(printer: TextPrinter, sink: &OutputSink) -> Self {
        Self {
            printer,
            epoch: sink.epoch(),
            printed: sink.lines().len(),
        }
    }

    pub fn flush(&mut self, sink: &OutputSink) {
        if sink.epoch() != self.epoch {
            self.epoch = sink.epoch();
            self.printed = 0;
        }
        for line in sink.lines().iter().skip(self.printed) {
            self.printer.print(line);
        }
        self.printed = sink.lines().len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_of_prefixes() {
        assert_eq!(severity_of("[Error] boom"), MessageKind::Error);
        assert_eq!(severity_of("[Warn] careful"), MessageKind::Warn);
        assert_eq!(severity_of("[Info] fyi"), MessageKind::Info);
        assert_eq!(severity_of("plain [Error] text"), MessageKind::Log);
    }
}
