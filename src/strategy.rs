//! Decides what a task failure turns into: ignore, retry, terminate, or
//! an orderly finish.

use process::{ErrorAction, ErrorStrategy, ProcessDef, Task};

use crate::error::Severity;

/// Apply the process's configured strategy to one classified failure.
///
/// `proc_errors` counts prior process-level failures (the retryable class
/// is never charged against it); `submit_retries` counts timed-out
/// submissions for this task, tracked apart from the failure counter.
pub fn resolve_action(
    proc: &ProcessDef,
    task: &Task,
    severity: Severity,
    proc_errors: u32,
    submit_retries: u32,
) -> ErrorAction {
    match severity {
        // user errors and guard failures can't be retried into working:
        Severity::Unrecoverable | Severity::Guard => ErrorAction::Terminate,

        // transient backend conditions retry for free:
        Severity::Retryable => ErrorAction::Retry,

        Severity::SubmitTimeout => match proc.strategy {
            ErrorStrategy::Retry if submit_retries <= proc.max_retries => ErrorAction::Retry,
            ErrorStrategy::Finish => ErrorAction::Finish,
            ErrorStrategy::Ignore => ErrorAction::Ignore,
            _ => ErrorAction::Terminate,
        },

        Severity::ProcessFail => match proc.strategy {
            ErrorStrategy::Ignore => ErrorAction::Ignore,
            ErrorStrategy::Finish => ErrorAction::Finish,
            ErrorStrategy::Terminate => ErrorAction::Terminate,
            ErrorStrategy::Retry => {
                let errors_left =
                    proc.max_errors < 0 || (proc_errors as i64) < proc.max_errors;
                if errors_left
                    && task.failures() <= proc.max_retries
                    && submit_retries <= proc.max_retries
                {
                    ErrorAction::Retry
                } else {
                    ErrorAction::Terminate
                }
            }
        },
    }
}
