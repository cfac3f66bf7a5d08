use std::fmt;
use std::path::PathBuf;

use crate::{FileHolder, InParamId, OutParamId, ProcessId, TaskContext, TaskId, Value};

/// Content hash identifying one task attempt. Work directories and cache
/// entries are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub [u8; 32]);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl Fingerprint {
    /// Short prefix used in log lines and directory names.
    pub fn short(&self) -> String {
        format!("{:02x}{:02x}{:02x}{:02x}", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

/// What the error strategy decided for a failed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    Ignore,
    Retry,
    Terminate,
    Finish,
}

/// Identity allocated at tuple intake, before materialization.
#[derive(Debug, Clone, Copy)]
pub struct TaskStart {
    pub id: TaskId,
    /// Monotone ordinal of this tuple within its process.
    pub tuple_index: u64,
}

/// One materialization of a process for one input tuple.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub process: ProcessId,
    /// 1-based; bumped on every failure retry.
    pub attempt: u32,
    /// Bumped on submit-timeout resubmission, separately from `attempt`.
    pub submit_attempt: u32,
    pub tuple_index: u64,
    /// Decoded input bindings, one per declared input param.
    pub inputs: Vec<(InParamId, Value)>,
    pub context: TaskContext,
    /// Command after template resolution; empty until materialized.
    pub command: String,
    pub work_dir: Option<PathBuf>,
    pub fingerprint: Option<Fingerprint>,
    pub exit: Option<i32>,
    pub failed: bool,
    pub cached: bool,
    pub error_action: Option<ErrorAction>,
    /// Collected outputs; None marks an optional output with no matches,
    /// which suppresses emission on that port for this tuple.
    pub outputs: Vec<(OutParamId, Option<Value>)>,
    /// Staged file inputs (the stage map).
    pub staged: Vec<FileHolder>,
    /// Stage name of the input fed to the command on stdin, if any.
    pub stdin: Option<String>,
}

impl Task {
    pub fn new(start: TaskStart, process: ProcessId, inputs: Vec<(InParamId, Value)>) -> Self {
        Self {
            id: start.id,
            process,
            attempt: 1,
            submit_attempt: 1,
            tuple_index: start.tuple_index,
            inputs,
            context: TaskContext::default(),
            command: String::new(),
            work_dir: None,
            fingerprint: None,
            exit: None,
            failed: false,
            cached: false,
            error_action: None,
            outputs: Vec::new(),
            staged: Vec::new(),
            stdin: None,
        }
    }

    /// Total failures so far for this task (the attempt index, 1-based,
    /// equals the failure count at decision time).
    pub fn failures(&self) -> u32 {
        self.attempt
    }

    /// Clone for resubmission after a failure: attempt bumped, execution
    /// state cleared, input bindings kept. The command is re-resolved by
    /// the materializer since directives may reference the attempt.
    pub fn retry_clone(&self) -> Self {
        let mut next = Self::new(
            TaskStart { id: self.id, tuple_index: self.tuple_index },
            self.process,
            self.inputs.clone(),
        );
        next.attempt = self.attempt + 1;
        next.submit_attempt = self.submit_attempt + 1;
        next
    }

    /// Clone for resubmission after a submit timeout: same attempt, only
    /// the submit counter moves.
    pub fn resubmit_clone(&self) -> Self {
        let mut next = Self::new(
            TaskStart { id: self.id, tuple_index: self.tuple_index },
            self.process,
            self.inputs.clone(),
        );
        next.attempt = self.attempt;
        next.submit_attempt = self.submit_attempt + 1;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_hex() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xab;
        bytes[31] = 0x01;
        let fp = Fingerprint(bytes);
        let hex = fp.to_string();
        assert_eq!(hex.len(), 64);
        assert!(hex.starts_with("ab"));
        assert!(hex.ends_with("01"));
    }

    #[test]
    fn test_retry_clone_bumps_attempt() {
        let t = Task::new(
            TaskStart { id: TaskId::from(5usize), tuple_index: 2 },
            ProcessId::from(0usize),
            Vec::new(),
        );
        let r = t.retry_clone();
        assert_eq!(r.attempt, 2);
        assert_eq!(r.submit_attempt, 2);
        assert_eq!(r.tuple_index, 2);
        assert!(r.work_dir.is_none());

        let s = t.resubmit_clone();
        assert_eq!(s.attempt, 1);
        assert_eq!(s.submit_attempt, 2);
    }
}
