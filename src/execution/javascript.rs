//! JavaScript sandbox runner.
//!
//! Each run gets its own `node` process. The user's source is evaluated in a
//! fresh `vm` context that only sees a forwarding `console` and timer
//! functions; everything it logs comes back as one JSON message per line on
//! the child's stdout.

use serde_json::Value;
use tempfile::TempDir;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::{Child, ChildStderr, ChildStdout},
    sync::mpsc::UnboundedSender,
    task::JoinHandle,
};

use super::{ExecutionError, ExecutionId};
use crate::{
    config::RuntimeSettings,
    controller::ControllerEvent,
    process::node::{permission_flag, start_node},
    protocol::{parse_frame, Envelope, OutputMessage},
};

const SOURCE_PLACEHOLDER: &str = "__PLAYGROUND_SOURCE__";

/// How the harness ends a frame that finishes the run.
const FATAL_SUFFIX: &str = r#","fatal":true}"#;

const HARNESS: &str = r#"'use strict';
const vm = require('node:vm');
const out = process.stdout;
const wellFormed = (text) => typeof text.toWellFormed === 'function'
  ? text.toWellFormed()
  : text.replace(/[\uD800-\uDBFF](?![\uDC00-\uDFFF])|(?<![\uD800-\uDBFF])[\uDC00-\uDFFF]/g, '\uFFFD');
const emit = (kind, values, fatal) => {
  values = values.map(wellFormed);
  try {
    out.write(JSON.stringify(fatal ? { kind, values, fatal } : { kind, values }) + '\n');
  } catch (_) {}
};
const show = (value) => {
  if (typeof value === 'string') return value;
  if (Object.prototype.toString.call(value) === '[object Error]') return String(value);
  if (value === undefined || typeof value === 'function' || typeof value === 'symbol' || typeof value === 'bigint') {
    return String(value);
  }
  try {
    const text = JSON.stringify(value);
    return text === undefined ? String(value) : text;
  } catch (_) {
    return String(value);
  }
};
const forward = (kind) => (...args) => emit(kind, args.map(show));
process.on('uncaughtException', (err) => emit('error', [show(err)]));
process.on('unhandledRejection', (reason) => emit('error', ['Uncaught (in promise) ' + show(reason)]));
const context = vm.createContext({
  console: Object.freeze({
    log: forward('log'),
    error: forward('error'),
    warn: forward('warn'),
    info: forward('info'),
  }),
  setTimeout,
  clearTimeout,
  setInterval,
  clearInterval,
  queueMicrotask,
}, { codeGeneration: { strings: true, wasm: false } });
const source = __PLAYGROUND_SOURCE__;
try {
  vm.runInContext(source, context, { filename: 'snippet.js' });
} catch (err) {
  emit('error', [show(err)], true);
}
"#;

/// Build the program handed to node for `source`.
pub fn build_harness(source: &str) -> String {
    let literal = Value::String(source.to_owned()).to_string();
    HARNESS.replacen(SOURCE_PLACEHOLDER, &literal, 1)
}

/// A live sandboxed JavaScript execution.
///
/// Dropping the sandbox kills the process, stops its reader and removes its
/// working directory, so no message can be produced for this run afterwards.
pub struct JsSandbox {
    id: ExecutionId,
    child: Child,
    tasks: Vec<JoinHandle<()>>,
    _workdir: TempDir,
}

impl JsSandbox {
    /// Start a sandbox for `source`, forwarding its messages to `events`.
    pub fn launch(
        settings: &RuntimeSettings,
        id: ExecutionId,
        source: &str,
        events: UnboundedSender<ControllerEvent>,
    ) -> Result<Self, ExecutionError> {
        let workdir = tempfile::Builder::new()
            .prefix("playground-js-")
            .tempdir()
            .map_err(ExecutionError::SandboxSpawn)?;
        let permission = if settings.js_permission_model {
            let flag = permission_flag(&settings.node_path).map_err(ExecutionError::SandboxSpawn)?;
            let Some(flag) = flag else {
                return Err(ExecutionError::SandboxUnavailable(format!(
                    "{} has no permission model (needs Node 20 or newer)",
                    settings.node_path
                )));
            };
            Some(flag)
        } else {
            tracing::warn!(run = %id, "javascript sandbox running without the node permission model");
            None
        };
        let handle =
            start_node(&settings.node_path, workdir.path(), permission).map_err(ExecutionError::SandboxSpawn)?;
        tracing::info!(run = %id, pid = ?handle.child.id(), "javascript sandbox started");

        let program = build_harness(source);
        let mut stdin = handle.stdin;
        let writer = tokio::spawn(async move {
            if let Err(err) = stdin.write_all(program.as_bytes()).await {
                tracing::warn!(error = %err, "failed to deliver program to sandbox");
            }
            // Closing stdin lets node start evaluating.
            let _ = stdin.shutdown().await;
        });
        let reader = tokio::spawn(forward_output(id, handle.stdout, handle.stderr, events));

        Ok(Self {
            id,
            child: handle.child,
            tasks: vec![writer, reader],
            _workdir: workdir,
        })
    }

    pub fn id(&self) -> ExecutionId {
        self.id
    }

    /// Kill the context and unsubscribe from its output.
    pub fn teardown(mut self) {
        self.stop();
        tracing::info!(run = %self.id, "javascript sandbox torn down");
    }

    fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if let Err(err) = self.child.start_kill() {
            // Already exited on its own.
            tracing::debug!(run = %self.id, error = %err, "sandbox kill");
        }
    }
}

impl Drop for JsSandbox {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Read the child's streams until both close.
///
/// Stdout carries protocol messages; stderr lines are surfaced as errors.
async fn forward_output(
    id: ExecutionId,
    stdout: ChildStdout,
    stderr: ChildStderr,
    events: UnboundedSender<ControllerEvent>,
) {
    let mut out = BufReader::new(stdout).lines();
    let mut err = BufReader::new(stderr).lines();
    let (mut out_open, mut err_open) = (true, true);

    while out_open || err_open {
        let (message, fatal) = tokio::select! {
            line = out.next_line(), if out_open => match line {
                Ok(Some(line)) => match parse_frame(&line) {
                    Some(frame) => (Some(frame.message), frame.fatal),
                    None => {
                        tracing::debug!(run = %id, "dropping malformed sandbox message");
                        (None, line.ends_with(FATAL_SUFFIX))
                    }
                },
                _ => {
                    out_open = false;
                    (None, false)
                }
            },
            line = err.next_line(), if err_open => match line {
                Ok(Some(line)) if !line.trim().is_empty() => (Some(OutputMessage::error(line)), false),
                Ok(Some(_)) => (None, false),
                _ => {
                    err_open = false;
                    (None, false)
                }
            },
        };

        if let Some(message) = message {
            if events
                .send(ControllerEvent::Message(Envelope { run: id, message }))
                .is_err()
            {
                return;
            }
        }
        if fatal && events.send(ControllerEvent::ScriptFailed(id)).is_err() {
            return;
        }
    }

    let _ = events.send(ControllerEvent::ContextExited(id));
}
