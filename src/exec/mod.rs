use std::path::{Path, PathBuf};

use anyhow::Result;

use process::{FileHolder, InKind, ProcessDef, Task};

/// The local backend: runs tasks as child processes on this machine
mod local;
pub use local::LocalExecutor;

/// Everything a backend needs to run one task attempt. The script is
/// fully assembled (shebang, exports, capture epilogue); the backend's
/// job is to materialize the staged inputs, run it in the work dir, and
/// leave the control files behind.
#[derive(Debug, Clone)]
pub struct Submission {
    /// For log lines: "process-name (task id)".
    pub label: String,
    pub work_dir: PathBuf,
    pub script: String,
    pub shell: String,
    /// Stage name of the file to feed on stdin, if any.
    pub stdin: Option<String>,
    pub staged: Vec<FileHolder>,
}

/// Contract the processor consumes from a concrete backend.
pub trait Executor: Send + Sync {
    fn name(&self) -> &str;

    /// Root under which task work dirs are created.
    fn work_root(&self) -> &Path;

    /// Where the file porter parks prefetched foreign files.
    fn stage_dir(&self) -> &Path;

    /// Project scripts directory added to the task PATH, if any.
    fn bin_dir(&self) -> Option<&Path> {
        None
    }

    /// True when the backend cannot read this path directly and it must
    /// be prefetched through the porter.
    fn is_foreign(&self, path: &Path) -> bool;

    /// Run one task to completion and return its exit status. Blocking;
    /// the operator's worker pool provides the concurrency.
    fn submit(&self, sub: &Submission) -> Result<i32>;

    /// Run a batch collected by the array collector. Backends with a
    /// native array construct override this.
    fn submit_array(&self, subs: &[Submission]) -> Result<Vec<i32>> {
        subs.iter().map(|s| self.submit(s)).collect()
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`, the shell's idea of a variable name.
pub(crate) fn valid_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Assemble the task environment: the configured base map plus env-kind
/// inputs, names validated, with PATH extended by the executor's bin dir.
pub fn assemble_env(proc: &ProcessDef, task: &Task, bin_dir: Option<&Path>) -> Vec<(String, String)> {
    let mut env: Vec<(String, String)> = Vec::with_capacity(proc.env.len() + 2);

    for (name, value) in &proc.env {
        push_checked(&mut env, name, value.clone());
    }
    for (pid, value) in &task.inputs {
        let param = proc.inputs.get(*pid);
        if param.kind == InKind::Env {
            push_checked(&mut env, &param.name, value.render());
        }
    }

    if let Some(bin) = bin_dir {
        let bin = bin.display().to_string();
        match env.iter().position(|(name, _)| name == "PATH") {
            Some(i) => env[i].1 = format!("{}:{}", env[i].1, bin),
            None => env.push(("PATH".to_owned(), format!("$PATH:{}", bin))),
        }
    }
    env
}

fn push_checked(env: &mut Vec<(String, String)>, name: &str, value: String) {
    if !valid_var_name(name) {
        log::warn!("dropping environment variable with invalid name: `{name}`");
        return;
    }
    if value.is_empty() {
        log::warn!("environment variable `{name}` has an empty value; exporting empty string");
    }
    env.push((name.to_owned(), value));
}
