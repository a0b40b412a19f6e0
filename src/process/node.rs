//! Node.js process bootstrap for sandboxed script runs.

use std::{
    collections::HashMap,
    io,
    path::Path,
    process::Stdio,
    sync::{Mutex, OnceLock, PoisonError},
};

use tokio::process::Command;

use super::{spawn_piped, ProcessHandle};

/// The command-line switch that turns on Node's permission model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionFlag {
    /// Node 23.5 and newer.
    Stable,
    /// Node 20 to 23.4.
    Experimental,
}

impl PermissionFlag {
    pub fn arg(self) -> &'static str {
        match self {
            PermissionFlag::Stable => "--permission",
            PermissionFlag::Experimental => "--experimental-permission",
        }
    }
}

static PERMISSION_FLAGS: OnceLock<Mutex<HashMap<String, Option<PermissionFlag>>>> = OnceLock::new();

/// Find which permission switch `node` accepts, if any.
///
/// The answer is cached per binary. Fails only when `node` cannot be run.
pub fn permission_flag(node: &str) -> io::Result<Option<PermissionFlag>> {
    let cache = PERMISSION_FLAGS.get_or_init(|| Mutex::new(HashMap::new()));
    if let Some(known) = cache.lock().unwrap_or_else(PoisonError::into_inner).get(node) {
        return Ok(*known);
    }

    let mut found = None;
    for flag in [PermissionFlag::Stable, PermissionFlag::Experimental] {
        let status = std::process::Command::new(node)
            .args([flag.arg(), "--no-warnings", "-e", ""])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        if status.success() {
            found = Some(flag);
            break;
        }
    }
    tracing::debug!(node, flag = ?found.map(PermissionFlag::arg), "node permission model");

    cache
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(node.to_owned(), found);
    Ok(found)
}

/// Start `node` reading its program from stdin.
///
/// The child gets an empty environment (only `PATH`, so `node` still
/// resolves) and `workdir` as its working directory. With a `permission`
/// flag, Node's permission model denies filesystem, child process and
/// worker access.
pub fn start_node(node: &str, workdir: &Path, permission: Option<PermissionFlag>) -> io::Result<ProcessHandle> {
    let mut cmd = Command::new(node);
    cmd.env_clear().current_dir(workdir).arg("--no-warnings");
    if let Some(path) = std::env::var_os("PATH") {
        cmd.env("PATH", path);
    }
    if let Some(flag) = permission {
        cmd.arg(flag.arg());
    }
    // `-` makes node read the program from stdin.
    cmd.arg("-");
    spawn_piped(&mut cmd)
}
