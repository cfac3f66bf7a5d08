//! Gathers a finished task's declared outputs from its work dir: stdout,
//! glob-matched files, environment and command-eval captures, lazy
//! values, and the default completion marker.

use std::path::Path;

use anyhow::{Context, Result};

use process::{OutKind, OutParam, PathType, ProcessDef, Task, Value};
use util::{HashMap, Hasher};

use crate::error::TaskError;
use crate::fs::paths;
use crate::fs::walk::{walk_matches, WalkOpts};

/// Traverse the declared outputs and bind each one from `work_dir`.
/// `None` slots mark optional outputs with nothing to bind; emission on
/// those ports is suppressed for this tuple only.
pub fn collect_outputs(proc: &ProcessDef, task: &mut Task, work_dir: &Path) -> Result<()> {
    // the capture file is parsed once, on first need:
    let mut captures: Option<HashMap<String, Capture>> = None;

    let mut outputs = Vec::with_capacity(proc.outputs.len());
    for (pid, param) in proc.outputs.iter_with_ids() {
        let slot = match param.kind {
            OutKind::Stdout => collect_stdout(proc, param, work_dir)?,
            OutKind::Path => collect_files(proc, task, param, work_dir)?,
            OutKind::Env | OutKind::CmdEval => {
                let caps = captures.get_or_insert_with(|| {
                    let text = std::fs::read_to_string(paths::command_env(work_dir))
                        .unwrap_or_default();
                    parse_env_captures(&text)
                });
                collect_capture(param, caps)?
            }
            OutKind::Val => {
                let expr = param
                    .expr
                    .as_ref()
                    .ok_or_else(|| TaskError::MissingValue(param.name.clone()))?;
                Some(Value::Str(expr.resolve(&task.context).with_context(|| {
                    format!("while resolving value output `{}`", param.name)
                })?))
            }
            OutKind::Default => Some(Value::Bool(true)),
        };
        outputs.push((pid, slot));
    }
    task.outputs = outputs;
    Ok(())
}

fn collect_stdout(proc: &ProcessDef, param: &OutParam, work_dir: &Path) -> Result<Option<Value>> {
    let out = paths::command_out(work_dir);
    if out.exists() {
        Ok(Some(Value::Path(out)))
    } else if param.optional {
        Ok(None)
    } else {
        Err(TaskError::MissingOutput {
            pattern: paths::COMMAND_OUT.to_owned(),
            process: proc.name.clone(),
            hint: String::new(),
        }
        .into())
    }
}

fn collect_files(
    proc: &ProcessDef,
    task: &Task,
    param: &OutParam,
    work_dir: &Path,
) -> Result<Option<Value>> {
    let mut matches = Vec::new();
    let mut inputs_removed = false;
    let mut shown_patterns = Vec::with_capacity(param.patterns.len());

    for pattern in &param.patterns {
        let pattern = pattern
            .resolve(&task.context)
            .with_context(|| format!("while resolving output pattern of `{}`", param.name))?;

        if pattern.contains(['*', '?', '[']) {
            let opts = WalkOpts {
                hidden: param.hidden || pattern.starts_with('.'),
                follow_links: param.follow_links,
                max_depth: param.max_depth,
                path_type: param.path_type.unwrap_or({
                    // `**` walks into subdirs, where matching the dirs
                    // themselves is rarely wanted:
                    if pattern.contains("**") { PathType::File } else { PathType::Any }
                }),
            };
            for path in walk_matches(work_dir, &pattern, &opts)? {
                let rel = path.strip_prefix(work_dir).unwrap_or(&path);
                if !param.include_inputs && is_staged_input(task, rel) {
                    inputs_removed = true;
                    continue;
                }
                matches.push(path);
            }
        } else {
            let literal = work_dir.join(&pattern);
            if literal.exists() || literal.is_symlink() {
                if !param.include_inputs && is_staged_input(task, Path::new(&pattern)) {
                    inputs_removed = true;
                } else {
                    matches.push(literal);
                }
            }
        }
        shown_patterns.push(pattern);
    }

    if matches.is_empty() {
        if param.optional {
            return Ok(None);
        }
        let hint = if inputs_removed {
            " (matching files were staged inputs and `includeInputs` is not set)"
        } else {
            ""
        };
        return Err(TaskError::MissingOutput {
            pattern: shown_patterns.join(" "),
            process: proc.name.clone(),
            hint: hint.to_owned(),
        }
        .into());
    }

    if !param.arity.contains(matches.len()) {
        return Err(TaskError::Arity {
            what: "output",
            name: param.name.clone(),
            found: matches.len(),
            min: param.arity.min,
            max: param.arity.max,
        }
        .into());
    }

    Ok(Some(if matches.len() == 1 {
        Value::Path(matches.remove(0))
    } else {
        Value::List(matches.into_iter().map(Value::Path).collect())
    }))
}

fn is_staged_input(task: &Task, rel: &Path) -> bool {
    task.staged
        .iter()
        .any(|h| Path::new(&h.stage_name) == rel)
}

fn collect_capture(param: &OutParam, caps: &HashMap<String, Capture>) -> Result<Option<Value>> {
    match caps.get(&param.name) {
        None => {
            if param.optional {
                Ok(None)
            } else {
                Err(TaskError::MissingValue(param.name.clone()).into())
            }
        }
        Some(cap) => {
            if param.kind == OutKind::CmdEval {
                if let Some(exit) = cap.exit {
                    if exit != 0 {
                        return Err(TaskError::CmdEval {
                            command: param
                                .expr
                                .as_ref()
                                .map(|t| t.raw().to_owned())
                                .unwrap_or_default(),
                            output: cap.value.clone(),
                            exit,
                        }
                        .into());
                    }
                }
            }
            Ok(Some(Value::Str(cap.value.clone())))
        }
    }
}

/// One `KEY=...` capture from `.command.env`.
#[derive(Debug, PartialEq)]
pub(crate) struct Capture {
    pub value: String,
    /// Exit status from a `/KEY/=exit:N` closer, for cmd-eval captures.
    pub exit: Option<i32>,
}

/// Resumable line parser for the capture file: `KEY=VALUE` opens a
/// capture, following lines append, `/KEY/` (optionally `=exit:N`)
/// closes it. Lines outside a capture are ignored.
pub(crate) fn parse_env_captures(text: &str) -> HashMap<String, Capture> {
    let mut caps = HashMap::with_capacity_and_hasher(4, Hasher::default());
    let mut open: Option<(String, String)> = None;

    for line in text.lines() {
        match open.take() {
            Some((name, mut value)) => {
                let closer = format!("/{name}/");
                if line == closer {
                    caps.insert(name, Capture { value, exit: None });
                } else if let Some(exit) = line
                    .strip_prefix(closer.as_str())
                    .and_then(|rest| rest.strip_prefix("=exit:"))
                {
                    let exit = exit.trim().parse().ok();
                    caps.insert(name, Capture { value, exit });
                } else {
                    value.push('\n');
                    value.push_str(line);
                    open = Some((name, value));
                }
            }
            None => {
                if let Some((key, first)) = line.split_once('=') {
                    if crate::exec::valid_var_name(key) {
                        open = Some((key.to_owned(), first.to_owned()));
                    }
                }
            }
        }
    }
    caps
}
