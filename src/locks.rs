use std::sync::{Arc, Mutex};

use process::Fingerprint;
use util::{HashMap, Hasher};

/// Process-wide table of per-fingerprint mutexes.
///
/// Holding a fingerprint's mutex is what makes work-dir creation
/// at-most-once per fingerprint across every operator in the session.
/// Holders do no I/O beyond the exists-check and mkdir, so entries are
/// held briefly; they stay in the table for the life of the session.
#[derive(Debug, Default)]
pub struct LockManager {
    table: Mutex<HashMap<Fingerprint, Arc<Mutex<()>>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::with_capacity_and_hasher(64, Hasher::default())),
        }
    }

    /// Get (or create) the mutex guarding `fp`. The caller locks the
    /// returned handle for the duration of its directory claim.
    pub fn entry(&self, fp: &Fingerprint) -> Arc<Mutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        table.entry(*fp).or_default().clone()
    }
}
