//! Cross-context message protocol.
//!
//! The sandbox speaks newline-delimited JSON objects of the shape
//! `{"kind": "log" | "error" | "warn" | "info", "values": [..]}`. The sender
//! is untrusted code, so parsing never fails loudly: anything that does not
//! look like a message is dropped.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{execution::ExecutionId, output::OutputSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Log,
    Error,
    Warn,
    Info,
}

impl MessageKind {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "log" => Some(MessageKind::Log),
            "error" => Some(MessageKind::Error),
            "warn" => Some(MessageKind::Warn),
            "info" => Some(MessageKind::Info),
            _ => None,
        }
    }

    /// Visible severity tag; `log` has none.
    pub fn prefix(self) -> &'static str {
        match self {
            MessageKind::Log => "",
            MessageKind::Error => "[Error] ",
            MessageKind::Warn => "[Warn] ",
            MessageKind::Info => "[Info] ",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputMessage {
    pub kind: MessageKind,
    pub values: Vec<String>,
}

impl OutputMessage {
    pub fn new(kind: MessageKind, values: Vec<String>) -> Self {
        Self { kind, values }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(MessageKind::Error, vec![text.into()])
    }

    /// One display line: values joined by a space, severity-prefixed.
    pub fn render(&self) -> String {
        format!("{}{}", self.kind.prefix(), self.values.join(" "))
    }
}

/// A message tagged with the run that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub run: ExecutionId,
    pub message: OutputMessage,
}

/// One line read from the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub message: OutputMessage,
    /// Set on the error that aborted the script's top level.
    pub fatal: bool,
}

/// Parse one raw line from the sandbox. Returns `None` for anything malformed.
pub fn parse_frame(raw: &str) -> Option<Frame> {
    let value: Value = serde_json::from_str(raw.trim()).ok()?;
    let obj = value.as_object()?;
    let kind = obj.get("kind")?.as_str().and_then(MessageKind::from_tag)?;
    let values = match obj.get("values") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().map(stringify).collect(),
        Some(other) => vec![stringify(other)],
    };
    let fatal = obj.get("fatal").and_then(Value::as_bool).unwrap_or(false);
    Some(Frame {
        message: OutputMessage { kind, values },
        fatal,
    })
}

pub fn parse_message(raw: &str) -> Option<OutputMessage> {
    parse_frame(raw).map(|frame| frame.message)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Deliver an envelope to the sink if it belongs to the active run.
///
/// Returns whether the message was appended.
pub fn route(active: Option<ExecutionId>, envelope: &Envelope, sink: &mut OutputSink) -> bool {
    if active != Some(envelope.run) {
        tracing::debug!(run = %envelope.run, "dropping message from inactive run");
        return false;
    }
    sink.append(envelope.message.render());
    true
}
