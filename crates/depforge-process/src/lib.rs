//! Shell-free child-process spawning.
//!
//! The package installer (and anything else in `depforge` that drives an
//! external tool) must never go through a shell: argv is passed to
//! `std::process::Command` directly, so no package name or flag is ever
//! subject to shell interpretation. Stdio is inherited rather than piped —
//! package managers print progress the user is meant to watch live.

use std::path::Path;
use std::process::Command;

/// Outcome of spawning and waiting on a child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnOutcome {
    /// The process ran to completion with this exit code.
    Exited(i32),
    /// The process could not be spawned at all (e.g. binary not found).
    SpawnFailed(String),
}

/// Spawn `program` with `args` in `working_dir`, no shell, stdio inherited
/// from this process, and block until it exits.
pub fn run_inherited(program: &str, args: &[&str], working_dir: &Path) -> SpawnOutcome {
    let mut command = Command::new(program);
    command.args(args).current_dir(working_dir);

    match command.status() {
        Ok(status) => SpawnOutcome::Exited(status.code().unwrap_or(-1)),
        Err(err) => SpawnOutcome::SpawnFailed(err.to_string()),
    }
}
