//! Dataflow task processor: the per-process state machine that consumes
//! input streams, materializes task instances, fingerprints them for
//! cache lookup, submits or resumes them, collects outputs, enforces the
//! error strategy, and emits to downstream channels.

/// Batched array submission
mod array;
/// Cache contracts and stored-output checks
mod cache;
/// Output collection after task completion
mod collect;
/// User-facing failure diagnostics
mod diag;
/// Error taxonomy and classification
mod error;
/// Executor contract and the local backend
mod exec;
/// Fingerprint hashing
mod fingerprint;
/// Filesystem operations and work-dir artifacts
mod fs;
/// Per-fingerprint lock table
mod locks;
/// Task construction from input tuples
mod materialize;
/// The per-process dataflow operator
mod operator;
/// Foreign-file prefetch contract
mod porter;
/// Fair emission ordering
mod sequencer;
/// Session-scoped shared state
mod session;
/// Per-process state accounting
mod state;
/// Input file staging
mod staging;
/// Failure handling policy
mod strategy;
/// Work-dir claiming and submission
mod submit;

pub use cache::{Cache, CacheEntry, DirCache, NoCache};
pub use diag::{TaskFault, TipProvider};
pub use error::{classify, Severity, TaskError};
pub use exec::{assemble_env, Executor, LocalExecutor, Submission};
pub use fingerprint::{rehash, task_fingerprint, FingerprintBuilder};
pub use fs::paths as work_dir_paths;
pub use fs::Fs;
pub use locks::LockManager;
pub use operator::{ProcessHandle, TaskProcessor};
pub use porter::{CopyPorter, FilePorter, ForeignBatch};
pub use sequencer::{Emission, Emitter, Sequencer};
pub use session::Session;
pub use staging::expand_stage_name;
pub use state::ProcStats;
pub use strategy::resolve_action;
pub use submit::MAX_CLAIM_ATTEMPTS;

// the data model is part of the public surface:
pub use process::{
    channel, Arity, ErrorAction, ErrorStrategy, FileHolder, FileSource, Fingerprint, HashMode,
    InKind, InParam, InParamId, InPort, Message, OutKind, OutParam, OutParamId, OutPort, PathType,
    ProcessDef, ProcessId, Task, TaskContext, TaskId, TaskStart, Tmpl, Value,
};
