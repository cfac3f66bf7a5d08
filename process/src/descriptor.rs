use std::path::PathBuf;

use util::IdVec;

use crate::{InParam, InParamId, OutParam, OutParamId, ProcessId, Tmpl};

/// What to do with a task failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStrategy {
    /// Abort the whole session immediately.
    Terminate,
    /// Stop taking new work, let in-flight tasks drain, then fail.
    Finish,
    /// Drop the task's outputs and keep going.
    Ignore,
    /// Resubmit with a bumped attempt index, within bounds.
    Retry,
}

/// How file values contribute to the fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashMode {
    /// Name, size and modification time.
    Standard,
    /// Full file content.
    Deep,
    /// Name and size only.
    Lenient,
}

/// Immutable configuration for one process, compiled once before the
/// operators are ignited.
#[derive(Debug, Clone)]
pub struct ProcessDef {
    pub id: ProcessId,
    pub name: String,
    pub inputs: IdVec<InParamId, InParam>,
    pub outputs: IdVec<OutParamId, OutParam>,
    pub command: Tmpl,
    /// Replacement command used when the session runs stubs.
    pub stub: Option<Tmpl>,
    /// Shell the command runs under; used for the generated shebang.
    pub shell: String,
    /// Boolean guard evaluated before materialization; false skips the task.
    pub when: Option<Tmpl>,
    pub strategy: ErrorStrategy,
    /// Extra attempts allowed per task under the Retry strategy.
    pub max_retries: u32,
    /// Process-wide failure budget; -1 means unlimited.
    pub max_errors: i64,
    /// Concurrent task ceiling; 0 means unlimited.
    pub max_forks: usize,
    /// Batch size for array submission; 0 disables batching.
    pub array: usize,
    /// Emit outputs in tuple order instead of completion order.
    pub fair: bool,
    pub hash_mode: HashMode,
    /// Whether results of this process may be reused from the cache.
    pub cache: bool,
    /// Persistent output directory checked before anything else runs.
    pub store_dir: Option<PathBuf>,
    /// Configured base environment for the task.
    pub env: Vec<(String, String)>,
    /// Container image identity, if the process runs containerized.
    pub container: Option<String>,
    /// Module/conda/arch labels that affect the execution environment.
    pub env_labels: Vec<String>,
}

impl ProcessDef {
    pub fn new(id: ProcessId, name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            inputs: IdVec::with_capacity(4),
            outputs: IdVec::with_capacity(4),
            command: Tmpl::new(command),
            stub: None,
            shell: "bash".to_owned(),
            when: None,
            strategy: ErrorStrategy::Terminate,
            max_retries: 1,
            max_errors: -1,
            max_forks: 0,
            array: 0,
            fair: false,
            hash_mode: HashMode::Standard,
            cache: true,
            store_dir: None,
            env: Vec::new(),
            container: None,
            env_labels: Vec::new(),
        }
    }

    pub fn add_input(&mut self, param: InParam) -> InParamId {
        self.inputs.push(param)
    }

    pub fn add_output(&mut self, param: OutParam) -> OutParamId {
        self.outputs.push(param)
    }
}
