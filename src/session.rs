//! Session-scoped shared state: ids, counters, the fingerprint lock
//! table, the staging temp dir, and the flags that used to be globals in
//! engines of this shape (error-shown, abort).

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Condvar, Mutex};

use anyhow::{Context, Result};
use tempfile::TempDir;

use process::{TaskId, TaskStart};

use crate::locks::LockManager;

pub struct Session {
    id: String,
    /// Ceiling on per-process worker groups.
    pub pool_size: usize,
    /// Cache lookups only happen on resumed sessions.
    pub resume: bool,
    /// Run stub blocks instead of real commands where declared.
    pub stub_run: bool,
    locks: LockManager,
    staging: TempDir,
    next_task: AtomicU32,
    /// Processes registered and not yet terminated.
    active: Mutex<usize>,
    drained: Condvar,
    aborted: AtomicBool,
    finishing: AtomicBool,
    /// At-most-once: the first task fault prints in full, the rest are
    /// suppressed to a single line.
    error_shown: AtomicBool,
}

impl Session {
    pub fn new() -> Result<Self> {
        let pool_size = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            pool_size,
            resume: false,
            stub_run: false,
            locks: LockManager::new(),
            staging: tempfile::tempdir().context("creating the session staging dir")?,
            next_task: AtomicU32::new(0),
            active: Mutex::new(0),
            drained: Condvar::new(),
            aborted: AtomicBool::new(false),
            finishing: AtomicBool::new(false),
            error_shown: AtomicBool::new(false),
        })
    }

    /// Resume under a prior session's id, so fingerprints line up with
    /// the cached runs that session left behind.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn with_stub_run(mut self, stub_run: bool) -> Self {
        self.stub_run = stub_run;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// Where synthetic input files are written; lives as long as the
    /// session.
    pub fn staging_dir(&self) -> &Path {
        self.staging.path()
    }

    /// Allocate the next task identity. Task ids are unique and monotone
    /// across every process in the session.
    pub fn next_task(&self, tuple_index: u64) -> TaskStart {
        let id = TaskId::from(self.next_task.fetch_add(1, Ordering::SeqCst) as usize);
        TaskStart { id, tuple_index }
    }

    // PROCESS REGISTRY //////////////////

    pub fn register(&self) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        *active += 1;
    }

    pub fn deregister(&self) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        *active -= 1;
        if *active == 0 {
            self.drained.notify_all();
        }
    }

    /// Block until every registered process has terminated.
    pub fn join(&self) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        while *active > 0 {
            active = self
                .drained
                .wait(active)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    // TERMINATION FLAGS /////////////////

    /// Hard cancel: no new submissions anywhere; in-flight tasks are the
    /// backend's to reap.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Soft stop: operators stop taking tuples, in-flight tasks drain.
    pub fn request_finish(&self) {
        self.finishing.store(true, Ordering::SeqCst);
    }

    pub fn finishing(&self) -> bool {
        self.finishing.load(Ordering::SeqCst)
    }

    /// True exactly once, for the caller that gets to print the full
    /// failure diagnostic.
    pub fn first_error(&self) -> bool {
        !self.error_shown.swap(true, Ordering::SeqCst)
    }
}
