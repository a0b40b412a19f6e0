//! Python interpreter process bootstrap.

use std::io;

use tokio::process::Command;

use super::{spawn_piped, ProcessHandle};

pub fn start_python(python: &str, bootstrap: &str) -> io::Result<ProcessHandle> {
    let mut cmd = Command::new(python);
    cmd.arg("-u") // unbuffered
        .arg("-I") // isolated: ignore PYTHON* env vars and user site-packages
        .arg("-c")
        .arg(bootstrap);
    spawn_piped(&mut cmd)
}
