//! The cache / work-dir coordination loop: probe the cache at each
//! attempt's fingerprint, and otherwise claim a fresh work dir under the
//! per-fingerprint lock.

use anyhow::Result;

use process::{ProcessDef, Task};

use crate::cache::{self, Cache};
use crate::error::TaskError;
use crate::exec::Executor;
use crate::fingerprint::rehash;
use crate::fs::{paths, Fs};
use crate::locks::LockManager;

/// Bound on consecutive work-dir claim collisions before failing hard. An
/// existing directory without a completed cache entry bumps the attempt
/// index; a slow filesystem could otherwise spin here forever.
pub const MAX_CLAIM_ATTEMPTS: u32 = 64;

#[derive(Debug, PartialEq, Eq)]
pub enum Claim {
    /// A prior run satisfied the task; outputs are already collected.
    Cached,
    /// A fresh work dir was created and recorded on the task.
    Fresh,
}

/// Resolve where this attempt runs. On entry `task.fingerprint` holds the
/// base (attempt-independent) fingerprint; on exit it holds the
/// attempt-specific one. Exactly one concurrent caller can claim a given
/// fingerprint: the rest observe the existing directory and move to the
/// next attempt index.
pub fn claim(
    proc: &ProcessDef,
    task: &mut Task,
    executor: &dyn Executor,
    cache: &dyn Cache,
    locks: &LockManager,
    fs: &Fs,
    use_cache: bool,
) -> Result<Claim> {
    let base = task
        .fingerprint
        .ok_or_else(|| anyhow::anyhow!("task reached submission without a fingerprint"))?;

    let mut attempt_ix = task.attempt;
    for _ in 0..MAX_CLAIM_ATTEMPTS {
        let h = rehash(&base, attempt_ix);

        if use_cache {
            if let Some(entry) = cache.lookup(&h, proc) {
                if cache::try_cached(proc, task, &entry)? {
                    task.fingerprint = Some(h);
                    return Ok(Claim::Cached);
                }
            }
        }

        let dir = paths::work_dir_for(executor.work_root(), &h);
        let entry = locks.entry(&h);
        let claimed = {
            let _guard = entry.lock().unwrap_or_else(|e| e.into_inner());
            if dir.exists() {
                false
            } else {
                fs.create_dir(&dir)?;
                true
            }
            // lock released here: nothing below touches the directory
            // name space
        };

        if !claimed {
            log::debug!(
                "work dir for {} already claimed, bumping attempt index",
                h.short()
            );
            attempt_ix += 1;
            continue;
        }

        task.fingerprint = Some(h);
        task.work_dir = Some(dir);
        return Ok(Claim::Fresh);
    }

    Err(TaskError::ClaimExhausted(MAX_CLAIM_ATTEMPTS).into())
}
