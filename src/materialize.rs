//! Builds a runnable task out of an input tuple: binds the non-file
//! context, evaluates the `when` guard, and resolves the command template.

use anyhow::{Context, Result};

use process::{InKind, ProcessDef, Task, Value};

use crate::error::TaskError;

/// Pass 1: decode non-file inputs into the task context and evaluate the
/// guard. Returns false when the guard says this tuple should not run;
/// the caller then finalizes the task as a no-op.
pub fn prepare(proc: &ProcessDef, task: &mut Task) -> Result<bool> {
    for (pid, value) in &task.inputs {
        let param = proc.inputs.get(*pid);
        match param.kind {
            // file kinds are deferred to staging pass 2:
            InKind::Path | InKind::Stdin => {}
            InKind::Val | InKind::Env | InKind::Each => {
                task.context.set(param.name.clone(), value.clone());
            }
        }
    }
    // directives and retried commands may reference the attempt:
    task.context
        .set("task.attempt", Value::Int(task.attempt as i64));

    match &proc.when {
        None => Ok(true),
        Some(guard) => {
            let text = guard
                .resolve(&task.context)
                .map_err(|e| TaskError::Guard(e.to_string()))?;
            Value::Str(text.clone())
                .as_bool()
                .ok_or_else(|| TaskError::Guard(format!("`{}` is not a boolean", text)).into())
        }
    }
}

/// Resolve the command (or the stub, on stub runs) against the completed
/// context. Re-run on every attempt: the context carries the attempt
/// index, so retried commands may differ.
pub fn resolve_command(proc: &ProcessDef, task: &Task, stub_run: bool) -> Result<String> {
    let tmpl = match (&proc.stub, stub_run) {
        (Some(stub), true) => stub,
        _ => &proc.command,
    };
    tmpl.resolve(&task.context)
        .with_context(|| format!("while resolving the command of process `{}`", proc.name))
}
