//! Run controller: the `Idle -> Running -> Idle` state machine.
//!
//! The controller owns the output sink and the single active execution.
//! Runner tasks never touch the sink directly; they post
//! [`ControllerEvent`]s, and every event is checked against the active run
//! before it has any effect.

use std::sync::Arc;

use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};

use crate::{
    config::RuntimeSettings,
    execution::{
        javascript::JsSandbox,
        python::{EngineState, PythonEngine},
        ExecutionError, ExecutionId, Language, RunRequest,
    },
    output::OutputSink,
    protocol::{self, Envelope},
};

pub const STOPPED_NOTICE: &str = "Execution stopped.";
pub const TIMEOUT_NOTICE: &str = "Time limit reached — stopping script.";
pub const PYTHON_RUNNING: &str = "Running Python...";
pub const PYTHON_LOADING: &str = "Loading Python runtime...";

#[derive(Debug)]
pub enum ControllerEvent {
    /// Console output forwarded from a sandbox.
    Message(Envelope),
    /// A sandbox process has closed its output streams.
    ContextExited(ExecutionId),
    /// The script's top level threw; its error has already been sent.
    ScriptFailed(ExecutionId),
    /// The wall-clock deadline of a run elapsed.
    Timeout(ExecutionId),
    /// A Python call resolved.
    PythonFinished {
        run: ExecutionId,
        outcome: Result<String, ExecutionError>,
    },
}

enum Handle {
    JavaScript(JsSandbox),
    /// The interpreter call itself cannot be preempted; only its result is
    /// tied to this run.
    Python,
}

struct ActiveRun {
    id: ExecutionId,
    language: Language,
    handle: Handle,
    timer: Option<JoinHandle<()>>,
    context_exited: bool,
}

impl ActiveRun {
    fn release(self) {
        if let Some(timer) = self.timer {
            timer.abort();
        }
        if let Handle::JavaScript(sandbox) = self.handle {
            sandbox.teardown();
        }
    }
}

pub struct RunController {
    settings: RuntimeSettings,
    engine: Arc<PythonEngine>,
    events: UnboundedSender<ControllerEvent>,
    sink: OutputSink,
    active: Option<ActiveRun>,
}

impl RunController {
    pub fn new(settings: RuntimeSettings) -> (Self, UnboundedReceiver<ControllerEvent>) {
        let engine = PythonEngine::new(settings.clone());
        Self::with_engine(settings, engine)
    }

    /// Build a controller around an existing engine.
    pub fn with_engine(
        settings: RuntimeSettings,
        engine: Arc<PythonEngine>,
    ) -> (Self, UnboundedReceiver<ControllerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let controller = Self {
            settings,
            engine,
            events,
            sink: OutputSink::new(),
            active: None,
        };
        (controller, rx)
    }

    pub fn sink(&self) -> &OutputSink {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut OutputSink {
        &mut self.sink
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    pub fn engine(&self) -> &Arc<PythonEngine> {
        &self.engine
    }

    pub fn engine_state(&self) -> EngineState {
        self.engine.state()
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    pub fn can_run(&self) -> bool {
        self.active.is_none()
    }

    pub fn can_stop(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_id(&self) -> Option<ExecutionId> {
        self.active.as_ref().map(|run| run.id)
    }

    pub fn active_language(&self) -> Option<Language> {
        self.active.as_ref().map(|run| run.language)
    }

    /// Whether the active JavaScript context has already exited on its own.
    pub fn active_context_exited(&self) -> bool {
        self.active.as_ref().is_some_and(|run| run.context_exited)
    }

    /// Start `request`, cancelling whatever is running first.
    ///
    /// Returns the id of the new run, or `None` when it could not start.
    pub fn run(&mut self, request: RunRequest) -> Option<ExecutionId> {
        if let Some(previous) = self.active.take() {
            tracing::info!(run = %previous.id, "cancelling previous run");
            previous.release();
        }

        let id = ExecutionId::new();
        tracing::info!(run = %id, language = %request.language, "run requested");
        match request.language {
            Language::JavaScript => self.start_javascript(id, &request.source),
            Language::Python => self.start_python(id, request.source),
        }
    }

    fn start_javascript(&mut self, id: ExecutionId, source: &str) -> Option<ExecutionId> {
        self.sink.reset("");
        let sandbox = match JsSandbox::launch(&self.settings, id, source, self.events.clone()) {
            Ok(sandbox) => sandbox,
            Err(err) => {
                tracing::error!(run = %id, error = %err, "sandbox setup failed");
                self.sink.reset(&err.to_string());
                return None;
            }
        };

        let events = self.events.clone();
        let deadline = self.settings.js_timeout;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            let _ = events.send(ControllerEvent::Timeout(id));
        });

        self.active = Some(ActiveRun {
            id,
            language: Language::JavaScript,
            handle: Handle::JavaScript(sandbox),
            timer: Some(timer),
            context_exited: false,
        });
        Some(id)
    }

    fn start_python(&mut self, id: ExecutionId, source: String) -> Option<ExecutionId> {
        let placeholder = match self.engine.state() {
            EngineState::Ready => PYTHON_RUNNING,
            _ => PYTHON_LOADING,
        };
        self.sink.reset(placeholder);

        let engine = Arc::clone(&self.engine);
        let events = self.events.clone();
        // Detached on purpose: Stop only releases the run, the call finishes
        // in the background and its result is dropped as stale.
        tokio::spawn(async move {
            let outcome = engine.execute(&source).await;
            let _ = events.send(ControllerEvent::PythonFinished { run: id, outcome });
        });

        self.active = Some(ActiveRun {
            id,
            language: Language::Python,
            handle: Handle::Python,
            timer: None,
            context_exited: false,
        });
        Some(id)
    }

    /// Stop the active run. A no-op when idle; returns whether anything stopped.
    pub fn stop(&mut self) -> bool {
        self.stop_with_notice(STOPPED_NOTICE)
    }

    /// Release the active run without writing a notice.
    pub fn release(&mut self) {
        if let Some(run) = self.active.take() {
            tracing::debug!(run = %run.id, "run released");
            run.release();
        }
    }

    fn stop_with_notice(&mut self, notice: &str) -> bool {
        let Some(run) = self.active.take() else {
            return false;
        };
        tracing::info!(run = %run.id, notice, "run stopped");
        run.release();
        self.sink.append(notice);
        true
    }

    /// Start the Python engine in the background so the first run is quick.
    pub fn warm_up(&self, language: Language) {
        if language != Language::Python || self.engine.state() != EngineState::Uninitialized {
            return;
        }
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            if let Err(err) = engine.ensure_ready().await {
                tracing::warn!(error = %err, "python warm-up failed");
            }
        });
    }

    pub fn handle_event(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::Message(envelope) => {
                protocol::route(self.active_id(), &envelope, &mut self.sink);
            }
            ControllerEvent::ContextExited(id) => match self.active.as_mut() {
                Some(run) if run.id == id => {
                    tracing::debug!(run = %id, "sandbox context exited");
                    run.context_exited = true;
                }
                _ => {}
            },
            ControllerEvent::ScriptFailed(id) => {
                if self.active_id() == Some(id) {
                    tracing::info!(run = %id, "script aborted by uncaught error");
                    self.release();
                }
            }
            ControllerEvent::Timeout(id) => {
                if self.active_id() == Some(id) {
                    tracing::warn!(run = %id, "time limit reached");
                    self.stop_with_notice(TIMEOUT_NOTICE);
                }
            }
            ControllerEvent::PythonFinished { run, outcome } => {
                if self.active_id() != Some(run) {
                    tracing::debug!(run = %run, "dropping result of inactive run");
                    return;
                }
                let text = match outcome {
                    Ok(output) => output,
                    Err(err @ ExecutionError::EngineUnavailable(_)) => err.to_string(),
                    Err(err) => format!("Error: {err}"),
                };
                self.sink.reset(&text);
                self.release();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{MessageKind, OutputMessage};

    fn unusable_settings() -> RuntimeSettings {
        RuntimeSettings {
            node_path: "/nonexistent/node-for-tests".into(),
            python_path: "/nonexistent/python-for-tests".into(),
            ..RuntimeSettings::default()
        }
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let (mut controller, _rx) = RunController::new(unusable_settings());
        controller.sink_mut().reset("previous output");
        assert!(!controller.stop());
        assert!(!controller.stop());
        assert_eq!(controller.sink().lines(), ["previous output"]);
        assert!(controller.can_run());
        assert!(!controller.can_stop());
    }

    #[tokio::test]
    async fn test_sandbox_spawn_failure_replaces_output() {
        let (mut controller, _rx) = RunController::new(unusable_settings());
        controller.sink_mut().append("stale");
        let started = controller.run(RunRequest::new(Language::JavaScript, "console.log(1)"));
        assert!(started.is_none());
        assert!(controller.can_run());
        assert_eq!(controller.sink().lines().len(), 1);
        assert!(controller.sink().lines()[0].starts_with("Failed to start JavaScript sandbox:"));
    }

    #[tokio::test]
    async fn test_timeout_for_other_run_is_ignored() {
        let (mut controller, _rx) = RunController::new(unusable_settings());
        let id = controller.run(RunRequest::new(Language::Python, "print(1)")).unwrap();
        controller.handle_event(ControllerEvent::Timeout(ExecutionId::new()));
        assert_eq!(controller.active_id(), Some(id));
        controller.handle_event(ControllerEvent::Timeout(id));
        assert!(controller.can_run());
        assert_eq!(controller.sink().lines().last().map(String::as_str), Some(TIMEOUT_NOTICE));
    }

    #[tokio::test]
    async fn test_script_failure_ends_run_without_notice() {
        let (mut controller, _rx) = RunController::new(unusable_settings());
        let id = controller.run(RunRequest::new(Language::Python, "")).unwrap();
        controller.handle_event(ControllerEvent::ScriptFailed(ExecutionId::new()));
        assert!(controller.is_running());
        controller.handle_event(ControllerEvent::ScriptFailed(id));
        assert!(controller.can_run());
        assert_eq!(controller.sink().lines(), [PYTHON_LOADING]);
    }

    #[tokio::test]
    async fn test_message_for_active_run_is_appended() {
        let (mut controller, _rx) = RunController::new(unusable_settings());
        let id = controller.run(RunRequest::new(Language::Python, "")).unwrap();
        controller.handle_event(ControllerEvent::Message(Envelope {
            run: id,
            message: OutputMessage::new(MessageKind::Info, vec!["hello".into()]),
        }));
        assert_eq!(controller.sink().lines().last().map(String::as_str), Some("[Info] hello"));
    }
}
