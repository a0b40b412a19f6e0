use std::time::Duration;

use playground::{
    config::RuntimeSettings,
    controller::{ControllerEvent, RunController, PYTHON_LOADING, STOPPED_NOTICE},
    execution::{python::EngineState, Language, RunRequest},
};
use tokio::sync::mpsc::UnboundedReceiver;

fn unusable_settings() -> RuntimeSettings {
    RuntimeSettings {
        node_path: "/nonexistent/node-for-tests".into(),
        python_path: "/nonexistent/python-for-tests".into(),
        ..RuntimeSettings::default()
    }
}

async fn next_event(rx: &mut UnboundedReceiver<ControllerEvent>) -> ControllerEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no controller event")
        .expect("controller channel closed")
}

#[tokio::test]
async fn test_unavailable_python_is_reported() {
    let (mut controller, mut rx) = RunController::new(unusable_settings());
    controller.run(RunRequest::new(Language::Python, "print(1)"));
    assert_eq!(controller.sink().lines(), [PYTHON_LOADING]);

    let event = next_event(&mut rx).await;
    controller.handle_event(event);

    assert!(controller.can_run());
    assert_eq!(controller.engine_state(), EngineState::Failed);
    assert_eq!(controller.sink().lines().len(), 1);
    assert!(controller.sink().lines()[0].starts_with("Python runtime not available:"));
}

#[tokio::test]
async fn test_result_after_stop_is_dropped() {
    let (mut controller, mut rx) = RunController::new(unusable_settings());
    controller.run(RunRequest::new(Language::Python, "print(1)"));
    assert!(controller.stop());
    assert!(!controller.stop());

    let event = next_event(&mut rx).await;
    assert!(matches!(event, ControllerEvent::PythonFinished { .. }));
    controller.handle_event(event);

    assert_eq!(controller.sink().lines(), [PYTHON_LOADING, STOPPED_NOTICE]);
}

#[tokio::test]
async fn test_only_latest_run_writes_result() {
    let (mut controller, mut rx) = RunController::new(unusable_settings());
    let first = controller.run(RunRequest::new(Language::Python, "print(1)")).unwrap();
    let second = controller.run(RunRequest::new(Language::Python, "print(2)")).unwrap();
    assert_ne!(first, second);
    assert_eq!(controller.active_id(), Some(second));

    for _ in 0..2 {
        let event = next_event(&mut rx).await;
        controller.handle_event(event);
    }

    assert!(controller.can_run());
    assert_eq!(controller.sink().lines().len(), 1);
}

#[tokio::test]
async fn test_switching_languages_cancels_previous_run() {
    let (mut controller, _rx) = RunController::new(unusable_settings());
    controller.run(RunRequest::new(Language::Python, "print(1)"));
    assert_eq!(controller.active_language(), Some(Language::Python));

    // The sandbox cannot start, so nothing is left running.
    assert!(controller.run(RunRequest::new(Language::JavaScript, "1")).is_none());
    assert!(controller.can_run());
    assert!(!controller.can_stop());
}

#[cfg(unix)]
#[tokio::test]
async fn test_node_without_permission_model_is_refused() {
    use std::os::unix::fs::PermissionsExt;

    // Rejects every permission switch, like node 18.
    let dir = tempfile::tempdir().unwrap();
    let node = dir.path().join("old-node");
    std::fs::write(&node, "#!/bin/sh\nexit 9\n").unwrap();
    std::fs::set_permissions(&node, std::fs::Permissions::from_mode(0o755)).unwrap();

    let settings = RuntimeSettings {
        node_path: node.display().to_string(),
        ..RuntimeSettings::default()
    };
    let (mut controller, _rx) = RunController::new(settings);

    assert!(controller.run(RunRequest::new(Language::JavaScript, "1")).is_none());
    assert!(controller.can_run());
    let message = controller.sink().text();
    assert!(message.starts_with("Failed to start JavaScript sandbox:"), "{message}");
    assert!(message.contains("no permission model"), "{message}");
}
