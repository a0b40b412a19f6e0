//! Interpreter process management (startup and piped I/O).

use std::io;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

pub mod node;
pub mod python;

pub struct ProcessHandle {
    pub child: Child,
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// Spawn `cmd` with all three standard streams piped.
///
/// The child is killed when its handle is dropped.
pub fn spawn_piped(cmd: &mut Command) -> io::Result<ProcessHandle> {
    cmd.stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);

    let mut child: Child = cmd.spawn()?;
    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "no stdin"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "no stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "no stderr"))?;

    Ok(ProcessHandle {
        child,
        stdin,
        stdout,
        stderr,
    })
}
