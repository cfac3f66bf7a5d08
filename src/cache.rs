//! Read-only cache contract and the checks that decide whether a prior
//! run (cached work dir, or a persistent store dir) can stand in for a
//! fresh submission.

use std::path::{Path, PathBuf};

use anyhow::Result;

use process::{Fingerprint, OutKind, ProcessDef, Task, TaskContext};

use crate::collect;
use crate::fs::paths;

/// A prior run found under a fingerprint.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub work_dir: PathBuf,
    /// The recorded run reached a terminal state.
    pub completed: bool,
    pub exit: i32,
    /// Stored context, needed when lazy value outputs are declared.
    pub context: Option<TaskContext>,
}

/// Content-addressed lookup the processor consumes. Implementations own
/// persistence; the core never writes through this.
pub trait Cache: Send + Sync {
    fn lookup(&self, fp: &Fingerprint, proc: &ProcessDef) -> Option<CacheEntry>;
}

/// Cache for sessions without resume support.
pub struct NoCache;

impl Cache for NoCache {
    fn lookup(&self, _fp: &Fingerprint, _proc: &ProcessDef) -> Option<CacheEntry> {
        None
    }
}

/// Cache that trusts the work tree itself: an entry exists when the
/// derived work dir is present, and is complete when its `.exitcode`
/// parses. This is what resume-from-disk looks like with no external
/// store.
pub struct DirCache {
    work_root: PathBuf,
}

impl DirCache {
    pub fn new(work_root: &Path) -> Self {
        Self { work_root: work_root.to_path_buf() }
    }
}

impl Cache for DirCache {
    fn lookup(&self, fp: &Fingerprint, _proc: &ProcessDef) -> Option<CacheEntry> {
        let work_dir = paths::work_dir_for(&self.work_root, fp);
        if !work_dir.is_dir() {
            return None;
        }
        let exit = paths::read_exitcode(&work_dir);
        Some(CacheEntry {
            work_dir,
            completed: exit.is_some(),
            exit: exit.unwrap_or(-1),
            context: None,
        })
    }
}

/// Exit statuses accepted as success for cache reuse.
fn accepted_exit(exit: i32) -> bool {
    exit == 0
}

/// Validate a cache entry against the task's declared outputs, and adopt
/// it on success: the task inherits the cached work dir, context, exit
/// status, and collected outputs. Any missing piece makes this a miss and
/// the task falls through to a fresh submission.
pub fn try_cached(proc: &ProcessDef, task: &mut Task, entry: &CacheEntry) -> Result<bool> {
    if !entry.completed || !accepted_exit(entry.exit) || !entry.work_dir.is_dir() {
        return Ok(false);
    }

    let declares_values = proc.outputs.iter().any(|p| p.kind == OutKind::Val);
    match &entry.context {
        Some(stored) => task.context.merge(stored),
        None => {
            if declares_values {
                log::debug!(
                    "cache entry for `{}` has no stored context but value outputs are declared",
                    proc.name
                );
                return Ok(false);
            }
        }
    }

    match collect::collect_outputs(proc, task, &entry.work_dir) {
        Ok(()) => {
            task.work_dir = Some(entry.work_dir.clone());
            task.exit = Some(entry.exit);
            task.cached = true;
            Ok(true)
        }
        Err(e) => {
            log::debug!("cached work dir rejected for `{}`: {e:#}", proc.name);
            Ok(false)
        }
    }
}

/// The complementary check for processes with a persistent `store_dir`:
/// when the directory already holds every declared file output, the task
/// skips entirely, with no work dir at all.
pub fn check_stored(proc: &ProcessDef, task: &mut Task) -> Result<bool> {
    let Some(store) = &proc.store_dir else {
        return Ok(false);
    };

    // outputs that can only come from an actual run rule the store out:
    let storable = proc.outputs.iter().all(|p| {
        matches!(p.kind, OutKind::Path | OutKind::Val | OutKind::Default)
    });
    if !storable {
        log::warn!(
            "process `{}` declares a store dir but has outputs that require a run; ignoring it",
            proc.name
        );
        return Ok(false);
    }
    if !store.is_dir() {
        return Ok(false);
    }

    match collect::collect_outputs(proc, task, store) {
        Ok(()) => {
            task.cached = true;
            log::info!("process `{}` output found in store dir, skipping", proc.name);
            Ok(true)
        }
        Err(e) => {
            log::debug!("store dir incomplete for `{}`: {e:#}", proc.name);
            task.outputs.clear();
            Ok(false)
        }
    }
}
