//! Names of the control files inside a task work dir, and the derivation
//! of work dir paths from fingerprints.

use std::path::{Path, PathBuf};

use process::Fingerprint;

/// The assembled script, shebang first.
pub const COMMAND_SH: &str = ".command.sh";
/// Captured stdout.
pub const COMMAND_OUT: &str = ".command.out";
/// Captured stderr.
pub const COMMAND_ERR: &str = ".command.err";
/// Wrapper log, for failures that never reach the script.
pub const COMMAND_LOG: &str = ".command.log";
/// KEY=VALUE captures delimited by /KEY/ closers.
pub const COMMAND_ENV: &str = ".command.env";
/// Integer exit status.
pub const EXITCODE: &str = ".exitcode";

pub fn command_sh(work_dir: &Path) -> PathBuf {
    work_dir.join(COMMAND_SH)
}

pub fn command_out(work_dir: &Path) -> PathBuf {
    work_dir.join(COMMAND_OUT)
}

pub fn command_err(work_dir: &Path) -> PathBuf {
    work_dir.join(COMMAND_ERR)
}

pub fn command_log(work_dir: &Path) -> PathBuf {
    work_dir.join(COMMAND_LOG)
}

pub fn command_env(work_dir: &Path) -> PathBuf {
    work_dir.join(COMMAND_ENV)
}

pub fn exitcode(work_dir: &Path) -> PathBuf {
    work_dir.join(EXITCODE)
}

/// Task directories are spread under the work root by the first hash byte:
/// `<root>/ab/cdef....`
pub fn work_dir_for(work_root: &Path, fp: &Fingerprint) -> PathBuf {
    let hex = fp.to_string();
    work_root.join(&hex[..2]).join(&hex[2..])
}

/// Read and parse the `.exitcode` file; None when absent or unparseable.
pub fn read_exitcode(work_dir: &Path) -> Option<i32> {
    let text = std::fs::read_to_string(exitcode(work_dir)).ok()?;
    text.trim().parse().ok()
}
