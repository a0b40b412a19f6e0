use std::time::Duration;

use playground::{
    config::RuntimeSettings,
    controller::{ControllerEvent, RunController, STOPPED_NOTICE, TIMEOUT_NOTICE},
    execution::{Language, RunRequest},
    process::node::permission_flag,
};
use tokio::sync::mpsc::UnboundedReceiver;

/// Settings for the local node, or `None` when node is missing or has no
/// permission model.
fn node_settings() -> Option<RuntimeSettings> {
    let settings = RuntimeSettings::default();
    match permission_flag(&settings.node_path) {
        Ok(Some(_)) => Some(settings),
        Ok(None) => {
            println!("node has no permission model, skipping");
            None
        }
        Err(_) => {
            println!("node not found, skipping");
            None
        }
    }
}

/// Feed events to the controller until `done` holds.
async fn drive_until(
    controller: &mut RunController,
    rx: &mut UnboundedReceiver<ControllerEvent>,
    done: impl Fn(&RunController) -> bool,
) {
    tokio::time::timeout(Duration::from_secs(15), async {
        while !done(controller) {
            let Some(event) = rx.recv().await else { break };
            controller.handle_event(event);
        }
    })
    .await
    .expect("run did not settle in time");
}

async fn run_to_exit(settings: RuntimeSettings, source: &str) -> Vec<String> {
    let (mut controller, mut rx) = RunController::new(settings);
    controller
        .run(RunRequest::new(Language::JavaScript, source))
        .expect("sandbox should start");
    drive_until(&mut controller, &mut rx, |c| c.active_context_exited() || !c.is_running()).await;
    controller.release();
    controller.sink().lines().to_vec()
}

#[tokio::test]
async fn test_messages_arrive_in_order() {
    let Some(settings) = node_settings() else { return };
    let lines = run_to_exit(settings, "for (let i = 0; i < 50; i++) console.log(i);").await;
    let expected: Vec<String> = (0..50).map(|i| i.to_string()).collect();
    assert_eq!(lines, expected);
}

#[tokio::test]
async fn test_console_kinds_are_prefixed() {
    let Some(settings) = node_settings() else { return };
    let source = "console.warn('w'); console.info('i'); console.error('e'); console.log('a', 1, {b: 2});";
    let lines = run_to_exit(settings, source).await;
    assert_eq!(lines, ["[Warn] w", "[Info] i", "[Error] e", r#"a 1 {"b":2}"#]);
}

#[tokio::test]
async fn test_uncaught_error_is_reported() {
    let Some(settings) = node_settings() else { return };
    let lines = run_to_exit(settings, "console.log('before'); throw new Error('boom');").await;
    assert_eq!(lines, ["before", "[Error] Error: boom"]);
}

#[tokio::test]
async fn test_async_output_is_captured() {
    let Some(settings) = node_settings() else { return };
    let lines = run_to_exit(settings, "setTimeout(() => console.log('later'), 50); console.log('now');").await;
    assert_eq!(lines, ["now", "later"]);
}

#[tokio::test]
async fn test_sandbox_has_no_host_globals() {
    let Some(settings) = node_settings() else { return };
    let lines = run_to_exit(
        settings,
        "console.log(typeof require, typeof process, typeof globalThis.fetch);",
    )
    .await;
    assert_eq!(lines, ["undefined undefined undefined"]);
}

#[tokio::test]
async fn test_infinite_loop_hits_time_limit() {
    let Some(settings) = node_settings() else { return };
    let settings = RuntimeSettings {
        js_timeout: Duration::from_secs(1),
        ..settings
    };
    let (mut controller, mut rx) = RunController::new(settings);
    controller
        .run(RunRequest::new(Language::JavaScript, "console.log('start'); while (true) {}"))
        .expect("sandbox should start");
    drive_until(&mut controller, &mut rx, |c| !c.is_running()).await;

    assert!(controller.can_run());
    assert_eq!(controller.sink().lines().last().map(String::as_str), Some(TIMEOUT_NOTICE));
}

#[tokio::test]
async fn test_no_output_after_stop() {
    let Some(settings) = node_settings() else { return };
    let (mut controller, mut rx) = RunController::new(settings);
    controller
        .run(RunRequest::new(Language::JavaScript, "setInterval(() => console.log('tick'), 10);"))
        .expect("sandbox should start");
    drive_until(&mut controller, &mut rx, |c| !c.sink().is_empty()).await;

    assert!(controller.stop());
    // Whatever the dead sandbox managed to queue must be ignored.
    let _ = tokio::time::timeout(Duration::from_millis(300), async {
        while let Some(event) = rx.recv().await {
            controller.handle_event(event);
        }
    })
    .await;

    assert_eq!(controller.sink().lines().last().map(String::as_str), Some(STOPPED_NOTICE));
    assert_eq!(
        controller.sink().lines().iter().filter(|l| *l == STOPPED_NOTICE).count(),
        1
    );
}

#[tokio::test]
async fn test_new_run_replaces_running_one() {
    let Some(settings) = node_settings() else { return };
    let (mut controller, mut rx) = RunController::new(settings);
    controller
        .run(RunRequest::new(Language::JavaScript, "setInterval(() => console.log('A'), 5);"))
        .expect("sandbox should start");
    drive_until(&mut controller, &mut rx, |c| !c.sink().is_empty()).await;

    let second = controller
        .run(RunRequest::new(Language::JavaScript, "console.log('B');"))
        .expect("sandbox should start");
    drive_until(&mut controller, &mut rx, |c| c.active_context_exited()).await;

    assert_eq!(controller.active_id(), Some(second));
    assert_eq!(controller.sink().lines(), ["B"]);
    controller.release();
}

#[tokio::test]
async fn test_host_realm_cannot_spawn_or_touch_files() {
    let Some(settings) = node_settings() else { return };
    let scratch = tempfile::tempdir().unwrap();
    let marker = scratch.path().join("MARKER");
    let marker_literal = serde_json::to_string(&marker.display().to_string()).unwrap();

    // console.log is a host function, so its constructor evaluates in the host realm.
    let source = format!(
        r#"
const host = console.log.constructor('return this')();
const load = (name) => host.process.getBuiltinModule
  ? host.process.getBuiltinModule(name)
  : host.process.mainModule.require(name);
const attempt = (label, action) => {{
  try {{ action(); console.log(label + ': allowed'); }}
  catch (err) {{ console.log(label + ': ' + (err.code || err.name)); }}
}};
attempt('spawn', () => load('child_process').execFileSync('/bin/sh', ['-c', 'echo x > ' + {marker_literal}]));
attempt('read', () => load('fs').readFileSync('/etc/passwd'));
attempt('write', () => load('fs').writeFileSync({marker_literal}, 'x'));
"#
    );

    let lines = run_to_exit(settings, &source).await;
    let attempts: Vec<&String> = lines
        .iter()
        .filter(|l| ["spawn:", "read:", "write:"].iter().any(|p| l.starts_with(p)))
        .collect();
    assert_eq!(attempts.len(), 3, "{lines:?}");
    assert!(attempts.iter().all(|l| !l.ends_with(": allowed")), "{lines:?}");
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_lone_surrogate_is_replaced_and_fatal_error_ends_run() {
    let Some(settings) = node_settings() else { return };
    let (mut controller, mut rx) = RunController::new(settings);
    controller
        .run(RunRequest::new(
            Language::JavaScript,
            "console.log('\\ud800'); throw new Error('x');",
        ))
        .expect("sandbox should start");
    drive_until(&mut controller, &mut rx, |c| !c.is_running()).await;

    assert_eq!(controller.sink().lines(), ["\u{FFFD}", "[Error] Error: x"]);
}
