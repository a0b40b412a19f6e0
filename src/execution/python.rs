//! Python runtime runner.
//!
//! A single long-lived interpreter process (the engine) is started on first
//! use. User code is wrapped so everything it writes to stdout/stderr lands in
//! one buffer, and the wrapper's last expression hands that buffer back as the
//! result of the call.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, MutexGuard, PoisonError,
    },
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
    process::{ChildStdin, ChildStdout},
    sync::{Mutex, OnceCell},
};

use super::ExecutionError;
use crate::{config::RuntimeSettings, process::python::start_python};

const INDENT: &str = "        ";

/// Worker program: reads JSON requests from stdin, evaluates them
/// asynchronously and answers with the value of the last expression.
const BOOTSTRAP: &str = r#"
import ast, asyncio, inspect, json, sys, traceback

_chan = sys.stdout
_inp = sys.stdin
_flags = ast.PyCF_ALLOW_TOP_LEVEL_AWAIT


async def _run(code, ns):
    result = eval(code, ns)
    if code.co_flags & inspect.CO_COROUTINE:
        result = await result
    return result


async def _evaluate(source):
    tree = ast.parse(source, "<playground>", "exec")
    last = None
    if tree.body and isinstance(tree.body[-1], ast.Expr):
        last = ast.Expression(tree.body.pop().value)
    ns = {"__name__": "__main__", "__builtins__": __builtins__}
    await _run(compile(tree, "<playground>", "exec", flags=_flags), ns)
    if last is None:
        return None
    return await _run(compile(last, "<playground>", "eval", flags=_flags), ns)


def _text(value):
    # Lone surrogates cannot cross the pipe as UTF-8; spell them out.
    return str(value).encode("utf-8", "backslashreplace").decode("utf-8")


def _send(payload):
    _chan.write(json.dumps(payload) + "\n")
    _chan.flush()


def _main():
    loop = asyncio.new_event_loop()
    _send({"ready": True, "version": sys.version.split()[0]})
    while True:
        line = _inp.readline()
        if not line:
            break
        try:
            req = json.loads(line)
        except ValueError:
            continue
        rid = req.get("id")
        try:
            value = loop.run_until_complete(_evaluate(req.get("code", "")))
            _send({"id": rid, "ok": True, "result": None if value is None else _text(value)})
        except BaseException as exc:
            text = "".join(traceback.format_exception_only(type(exc), exc)).strip()
            _send({"id": rid, "ok": False, "error": _text(text)})


_main()
"#;

/// Embed `source` in a wrapper that captures its stdout/stderr.
///
/// The wrapper evaluates to the captured text.
pub fn wrap_source(source: &str) -> String {
    let mut body = String::new();
    for line in source.lines() {
        if !line.is_empty() {
            body.push_str(INDENT);
        }
        body.push_str(line);
        body.push('\n');
    }

    format!(
        "import sys as _pg_sys, io as _pg_io, traceback as _pg_tb\n\
         _pg_buf = _pg_io.StringIO()\n\
         _pg_saved = (_pg_sys.stdout, _pg_sys.stderr, _pg_sys.stdin)\n\
         _pg_sys.stdout = _pg_sys.stderr = _pg_buf\n\
         _pg_sys.stdin = _pg_io.StringIO()\n\
         try:\n    \
             try:\n{INDENT}\
                 pass\n\
         {body}    \
             except BaseException:\n{INDENT}\
                 _pg_tb.print_exc()\n\
         finally:\n    \
             _pg_sys.stdout, _pg_sys.stderr, _pg_sys.stdin = _pg_saved\n\
         _pg_buf.getvalue()\n"
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

#[derive(Serialize)]
struct Request<'a> {
    id: u64,
    code: &'a str,
}

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Ready {
    ready: bool,
    #[serde(default)]
    version: Option<String>,
}

struct Channel {
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
}

struct EngineProcess {
    channel: Mutex<Channel>,
    version: String,
    /// Set by the exit watcher once the worker process is gone.
    exited: Arc<AtomicBool>,
}

impl EngineProcess {
    fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    async fn call(&self, id: u64, code: &str) -> Result<String, ExecutionError> {
        let mut payload = serde_json::to_string(&Request { id, code })
            .map_err(|e| ExecutionError::Engine(e.to_string()))?;
        payload.push('\n');

        let mut channel = self.channel.lock().await;
        let delivered = match channel.stdin.write_all(payload.as_bytes()).await {
            Ok(()) => channel.stdin.flush().await,
            Err(err) => Err(err),
        };
        if let Err(err) = delivered {
            self.exited.store(true, Ordering::SeqCst);
            return Err(ExecutionError::Engine(format!("python engine is gone: {err}")));
        }

        // Responses start with their id; see `_send` in the worker.
        let own_prefix = format!("{{\"id\": {id},");
        loop {
            let line = match channel.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    self.exited.store(true, Ordering::SeqCst);
                    return Err(ExecutionError::Engine("python engine exited".into()));
                }
                Err(err) => return Err(ExecutionError::Engine(err.to_string())),
            };
            let response = match serde_json::from_str::<Response>(&line) {
                Ok(response) => response,
                Err(err) if line.starts_with(&own_prefix) => {
                    return Err(ExecutionError::Engine(format!(
                        "unreadable response from python engine: {err}"
                    )));
                }
                Err(_) => {
                    tracing::debug!("ignoring non-protocol line from python engine");
                    continue;
                }
            };
            if response.id != Some(id) {
                // Answer to an abandoned request.
                continue;
            }
            return if response.ok {
                Ok(response.result.unwrap_or_default())
            } else {
                Err(ExecutionError::Engine(
                    response.error.unwrap_or_else(|| "unknown engine error".into()),
                ))
            };
        }
    }
}

/// One start of the worker. Replaced with a fresh one when the worker dies.
type Generation = Arc<OnceCell<Result<Arc<EngineProcess>, String>>>;

/// Lazily started Python interpreter shared by all runs.
pub struct PythonEngine {
    settings: RuntimeSettings,
    generation: std::sync::Mutex<Generation>,
    initializing: AtomicBool,
    next_id: AtomicU64,
}

impl PythonEngine {
    pub fn new(settings: RuntimeSettings) -> Arc<Self> {
        Arc::new(Self {
            settings,
            generation: std::sync::Mutex::new(Arc::new(OnceCell::new())),
            initializing: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn state(&self) -> EngineState {
        let generation = self.generation();
        match generation.get() {
            // Dead worker; the next run starts a new one.
            Some(Ok(engine)) if engine.has_exited() => EngineState::Uninitialized,
            Some(Ok(_)) => EngineState::Ready,
            Some(Err(_)) => EngineState::Failed,
            None if self.initializing.load(Ordering::SeqCst) => EngineState::Initializing,
            None => EngineState::Uninitialized,
        }
    }

    /// Interpreter version once the engine is up.
    pub fn version(&self) -> Option<String> {
        match self.generation().get() {
            Some(Ok(engine)) if !engine.has_exited() => Some(engine.version.clone()),
            _ => None,
        }
    }

    /// Start the engine if needed. Concurrent callers share one start-up.
    /// A failed start is kept; a worker that exits is replaced on next use.
    pub async fn ensure_ready(&self) -> Result<(), ExecutionError> {
        self.ready_engine().await.map(|_| ())
    }

    /// Evaluate `code` on the engine and return the value of its last
    /// expression as text (empty when there is none).
    pub async fn run_async(&self, code: &str) -> Result<String, ExecutionError> {
        let (generation, engine) = self.ready_engine().await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let outcome = engine.call(id, code).await;
        if engine.has_exited() {
            self.retire(&generation);
        }
        outcome
    }

    /// Wrap and run user source, returning everything it printed.
    pub async fn execute(&self, source: &str) -> Result<String, ExecutionError> {
        self.run_async(&wrap_source(source)).await
    }

    async fn ready_engine(&self) -> Result<(Generation, Arc<EngineProcess>), ExecutionError> {
        // A worker that dies right after its handshake gets one replacement.
        for _ in 0..2 {
            let generation = self.generation();
            let engine = match generation.get_or_init(|| self.start()).await {
                Ok(engine) => Arc::clone(engine),
                Err(err) => return Err(ExecutionError::EngineUnavailable(err.clone())),
            };
            if !engine.has_exited() {
                return Ok((generation, engine));
            }
            self.retire(&generation);
        }
        Err(ExecutionError::EngineUnavailable(
            "python engine keeps exiting".into(),
        ))
    }

    async fn start(&self) -> Result<Arc<EngineProcess>, String> {
        self.initializing.store(true, Ordering::SeqCst);
        let outcome = boot(&self.settings).await.map(Arc::new);
        self.initializing.store(false, Ordering::SeqCst);
        match &outcome {
            Ok(engine) => tracing::info!(version = %engine.version, "python engine ready"),
            Err(err) => tracing::error!(error = %err, "python engine failed to start"),
        }
        outcome
    }

    fn retire(&self, generation: &Generation) {
        let mut current = self.lock_generation();
        if Arc::ptr_eq(&current, generation) {
            tracing::warn!("python engine exited; a new one starts on the next run");
            *current = Arc::new(OnceCell::new());
        }
    }

    fn generation(&self) -> Generation {
        Arc::clone(&self.lock_generation())
    }

    fn lock_generation(&self) -> MutexGuard<'_, Generation> {
        self.generation.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn boot(settings: &RuntimeSettings) -> Result<EngineProcess, String> {
    let handle = start_python(&settings.python_path, BOOTSTRAP)
        .map_err(|e| format!("could not start {}: {e}", settings.python_path))?;
    let mut lines = BufReader::new(handle.stdout).lines();

    let first = tokio::time::timeout(settings.python_init_timeout, lines.next_line())
        .await
        .map_err(|_| "timed out waiting for the interpreter".to_string())?
        .map_err(|e| e.to_string())?;

    let ready = first
        .as_deref()
        .and_then(|line| serde_json::from_str::<Ready>(line).ok())
        .filter(|ready| ready.ready);
    let Some(ready) = ready else {
        let mut stderr = BufReader::new(handle.stderr).lines();
        let detail = tokio::time::timeout(Duration::from_millis(500), stderr.next_line())
            .await
            .ok()
            .and_then(Result::ok)
            .flatten()
            .unwrap_or_else(|| "interpreter exited during start-up".into());
        return Err(detail);
    };

    // Drain stderr so a chatty interpreter never blocks on a full pipe.
    let mut stderr = BufReader::new(handle.stderr).lines();
    tokio::spawn(async move {
        while let Ok(Some(line)) = stderr.next_line().await {
            tracing::debug!(target: "python_engine", "{line}");
        }
    });

    // The watcher owns the child. Dropping the engine closes its stdin, which
    // ends the worker loop.
    let exited = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&exited);
    let mut child = handle.child;
    tokio::spawn(async move {
        let status = child.wait().await;
        flag.store(true, Ordering::SeqCst);
        tracing::info!(?status, "python engine process exited");
    });

    Ok(EngineProcess {
        channel: Mutex::new(Channel {
            stdin: handle.stdin,
            lines,
        }),
        version: ready.version.unwrap_or_else(|| "unknown".into()),
        exited,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_source_shape() {
        let wrapped = wrap_source("print('hi')\nif True:\n    x = 1\n");
        let expected = "\
import sys as _pg_sys, io as _pg_io, traceback as _pg_tb
_pg_buf = _pg_io.StringIO()
_pg_saved = (_pg_sys.stdout, _pg_sys.stderr, _pg_sys.stdin)
_pg_sys.stdout = _pg_sys.stderr = _pg_buf
_pg_sys.stdin = _pg_io.StringIO()
try:
    try:
        pass
        print('hi')
        if True:
            x = 1
    except BaseException:
        _pg_tb.print_exc()
finally:
    _pg_sys.stdout, _pg_sys.stderr, _pg_sys.stdin = _pg_saved
_pg_buf.getvalue()
";
        assert_eq!(wrapped, expected);
    }

    #[test]
    fn test_wrap_empty_source_is_valid_block() {
        let wrapped = wrap_source("");
        assert!(wrapped.contains("    try:\n        pass\n    except BaseException:"));
    }

    #[test]
    fn test_wrap_keeps_blank_lines_blank() {
        let wrapped = wrap_source("a = 1\n\nb = 2\r\n");
        assert!(wrapped.contains("        a = 1\n\n        b = 2\n"));
    }

    #[test]
    fn test_worker_spells_out_unencodable_text() {
        assert!(BOOTSTRAP.contains(r#"encode("utf-8", "backslashreplace")"#));
        assert!(BOOTSTRAP.contains(r#""result": None if value is None else _text(value)"#));
    }

    #[test]
    fn test_new_engine_is_uninitialized() {
        let engine = PythonEngine::new(RuntimeSettings::default());
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert!(engine.version().is_none());
    }
}
