//! Normalizes input values into staged file holders: lifts scalars,
//! expands staging-name wildcards, writes synthetic inputs to temp files,
//! batches foreign files for prefetch, and rejects stage-name collisions.

use std::path::Path;

use anyhow::{Context, Result};

use process::{FileHolder, FileSource, InKind, ProcessDef, Task, Value};
use util::{HashSet, Hasher};

use crate::error::TaskError;
use crate::exec::Executor;
use crate::fs::Fs;
use crate::porter::{FilePorter, ForeignBatch};

/// Pass 2 of task materialization: stage every file-kind input.
///
/// Runs after the non-file context is bound (pass 1), so lazy staging
/// patterns may reference values bound there. Fails before anything is
/// submitted on arity violations or staged-name collisions, and transfers
/// the foreign batch before returning.
pub fn stage_files(
    proc: &ProcessDef,
    task: &mut Task,
    executor: &dyn Executor,
    porter: &dyn FilePorter,
    fs: &Fs,
    staging_root: &Path,
) -> Result<()> {
    let mut batch = ForeignBatch::new(executor.stage_dir());
    let mut synthetic_count = 0usize;

    for (pid, value) in task.inputs.clone() {
        let param = proc.inputs.get(pid);
        if !matches!(param.kind, InKind::Path | InKind::Stdin) {
            continue;
        }

        let elements = value.elements().to_vec();
        if !param.arity.contains(elements.len()) {
            return Err(TaskError::Arity {
                what: "input",
                name: param.name.clone(),
                found: elements.len(),
                min: param.arity.min,
                max: param.arity.max,
            }
            .into());
        }

        // a lazy pattern may reference pass-1 context values:
        let pattern = match &param.stage_pattern {
            Some(tmpl) => Some(tmpl.resolve(&task.context)?),
            None => None,
        };

        let mut holders = Vec::with_capacity(elements.len());
        for (idx, element) in elements.iter().enumerate() {
            let n = idx + 1;
            let mut holder = normalize(
                element,
                executor,
                &mut batch,
                fs,
                staging_root,
                task,
                &mut synthetic_count,
            )?;
            if let Some(pattern) = &pattern {
                let expanded = expand_stage_name(pattern, n, elements.len());
                // a bare `*` strips to nothing; keep the source name then:
                if !expanded.is_empty() {
                    holder.stage_name = expanded;
                }
            }
            holders.push(holder);
        }

        if param.kind == InKind::Stdin {
            task.stdin = holders.first().map(|h| h.stage_name.clone());
        }

        // the command addresses these by stage name:
        let bound = if holders.len() == 1 {
            Value::File(holders[0].clone())
        } else {
            Value::List(holders.iter().cloned().map(Value::File).collect())
        };
        task.context.set(param.name.clone(), bound);
        task.staged.extend(holders);
    }

    check_collisions(&task.staged)?;

    if !batch.is_empty() {
        porter
            .transfer(&batch)
            .context("while prefetching foreign input files")?;
    }
    Ok(())
}

/// Turn one input element into a holder. Paths stay where they are (or
/// enter the foreign batch); anything else is stringified into a fresh
/// `input.<n>` temp file, keeping the literal so fingerprints see content
/// rather than the random temp path.
fn normalize(
    element: &Value,
    executor: &dyn Executor,
    batch: &mut ForeignBatch,
    fs: &Fs,
    staging_root: &Path,
    task: &Task,
    synthetic_count: &mut usize,
) -> Result<FileHolder> {
    match element {
        Value::File(h) => Ok(h.clone()),
        Value::Path(p) => {
            let source = if executor.is_foreign(p) {
                let local = batch.add(p);
                FileSource::Foreign { remote: p.clone(), local }
            } else {
                FileSource::Local(p.clone())
            };
            let mut holder = FileHolder { source, stage_name: String::new() };
            holder.stage_name = holder.source_name();
            Ok(holder)
        }
        Value::List(_) | Value::Map(_) => Err(TaskError::NotAFile(element.clone()).into()),
        other => {
            *synthetic_count += 1;
            let name = format!("input.{}", synthetic_count);
            let literal = other.render();
            let dir = staging_root.join(format!("task-{}-{}", task.id, task.attempt));
            fs.create_dir(&dir)?;
            let local = dir.join(&name);
            fs.write_file(&local, &literal)
                .context("while writing synthetic input file")?;
            Ok(FileHolder {
                source: FileSource::Synthetic { literal, local },
                stage_name: name,
            })
        }
    }
}

/// Expand a staging-name template against a collection of `len` files,
/// for the 1-based member `n`:
/// - a template with no wildcard gets `*` appended when `len > 1`;
/// - each run of `?` becomes `n`, left-zero-padded to the wider of the
///   run length and the digits of `len` (so expansions sort
///   lexicographically in collection order);
/// - `*` becomes `n`, or is stripped entirely when the collection has
///   exactly one element.
pub fn expand_stage_name(template: &str, n: usize, len: usize) -> String {
    let mut template = template.to_owned();
    if !template.contains(['*', '?']) && len > 1 {
        template.push('*');
    }

    let width = digits(len);
    let mut out = String::with_capacity(template.len() + 4);
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '?' => {
                let mut run = 1;
                while chars.peek() == Some(&'?') {
                    chars.next();
                    run += 1;
                }
                out.push_str(&zero_pad(n, run.max(width)));
            }
            '*' => {
                if len > 1 {
                    out.push_str(&zero_pad(n, width));
                }
                // a single-element collection strips the star, yielding
                // the bare base name
            }
            c => out.push(c),
        }
    }
    out
}

fn digits(mut n: usize) -> usize {
    let mut d = 1;
    while n >= 10 {
        n /= 10;
        d += 1;
    }
    d
}

fn zero_pad(n: usize, width: usize) -> String {
    format!("{:0width$}", n, width = width)
}

/// Two inputs staging under the same name would overwrite each other in
/// the work dir; fail listing the offenders.
fn check_collisions(holders: &[FileHolder]) -> Result<()> {
    let mut seen = HashSet::with_capacity_and_hasher(holders.len(), Hasher::default());
    let mut dupes = Vec::new();
    for holder in holders {
        if !seen.insert(holder.stage_name.as_str()) && !dupes.contains(&holder.stage_name) {
            dupes.push(holder.stage_name.clone());
        }
    }
    if dupes.is_empty() {
        Ok(())
    } else {
        Err(TaskError::StageCollision(dupes.join(", ")).into())
    }
}
