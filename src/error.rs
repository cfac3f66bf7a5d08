use process::{TmplError, Value};

/// Broad failure classes the strategy engine dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Template/value/path errors the user must fix; never retried.
    Unrecoverable,
    /// Transient backend conditions (spot reclaim and friends); retried
    /// without charging the process error budget.
    Retryable,
    /// The backend did not accept the submission in time; retried on the
    /// submit counter, not the task failure counter.
    SubmitTimeout,
    /// The task itself failed: non-zero exit, missing output, bad arity.
    ProcessFail,
    /// The `when` guard could not be evaluated.
    Guard,
}

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task failed with exit status {0}")]
    Failed(i32),

    #[error("Missing output file(s) `{pattern}` expected by process `{process}`{hint}")]
    MissingOutput {
        pattern: String,
        process: String,
        /// " (note: matching files were staged inputs)" or empty.
        hint: String,
    },

    #[error("Missing value declared as output `{0}`")]
    MissingValue(String),

    #[error(
        "Incorrect number of files ({found}) for {what} `{name}`: \
         expected between {min} and {max}"
    )]
    Arity {
        what: &'static str,
        name: String,
        found: usize,
        min: u32,
        max: u32,
    },

    #[error("Staged input name collision: {0}")]
    StageCollision(String),

    #[error("Output command `{command}` returned exit status {exit}: {output}")]
    CmdEval {
        command: String,
        output: String,
        exit: i32,
    },

    #[error("When guard could not be evaluated: {0}")]
    Guard(String),

    #[error("Submission timed out")]
    SubmitTimeout,

    #[error("Transient executor failure: {0}")]
    Retryable(String),

    #[error("Input value of type {} is not a file path", .0.type_name())]
    NotAFile(Value),

    #[error("Could not claim a work directory after {0} attempts")]
    ClaimExhausted(u32),

    #[error("Output binding arrived for tuple {index} after emission passed {watermark}")]
    SequenceRegression { index: u64, watermark: u64 },

    #[error("Process declares an array size of {array} larger than its max forks ({max_forks})")]
    ArrayExceedsForks { array: usize, max_forks: usize },
}

impl TaskError {
    pub fn severity(&self) -> Severity {
        match self {
            Self::Failed(_)
            | Self::MissingOutput { .. }
            | Self::MissingValue(_)
            | Self::Arity { .. }
            | Self::CmdEval { .. } => Severity::ProcessFail,
            Self::SubmitTimeout => Severity::SubmitTimeout,
            Self::Retryable(_) => Severity::Retryable,
            Self::Guard(_) => Severity::Guard,
            Self::StageCollision(_)
            | Self::NotAFile(_)
            | Self::ClaimExhausted(_)
            | Self::SequenceRegression { .. }
            | Self::ArrayExceedsForks { .. } => Severity::Unrecoverable,
        }
    }
}

/// Classify an arbitrary error chain for the strategy engine.
/// Anything we don't recognize is unrecoverable: we dump it and stop
/// rather than retrying blind.
pub fn classify(e: &anyhow::Error) -> Severity {
    for cause in e.chain() {
        if let Some(te) = cause.downcast_ref::<TaskError>() {
            return te.severity();
        }
        if cause.downcast_ref::<TmplError>().is_some() {
            return Severity::Unrecoverable;
        }
    }
    Severity::Unrecoverable
}
