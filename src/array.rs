//! Buffers ready-to-run submissions so backends with a native array
//! construct get batches instead of single tasks.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::exec::{Executor, Submission};
use crate::state::ProcStats;

struct Pending {
    sub: Submission,
    tx: Sender<Result<i32>>,
}

struct Buffer {
    pending: Vec<Pending>,
    closed: bool,
}

/// Collects up to `k` submissions before handing them to the executor as
/// one batch. Flushes on size, and on close once every in-flight task is
/// parked here (a smaller final batch).
pub struct ArrayCollector {
    k: usize,
    executor: Arc<dyn Executor>,
    stats: Arc<ProcStats>,
    buffer: Mutex<Buffer>,
}

impl ArrayCollector {
    pub fn new(k: usize, executor: Arc<dyn Executor>, stats: Arc<ProcStats>) -> Self {
        Self {
            k,
            executor,
            stats,
            buffer: Mutex::new(Buffer { pending: Vec::with_capacity(k), closed: false }),
        }
    }

    /// Park a submission. The worker blocks on the returned receiver
    /// until some flusher runs the batch and reports this task's exit.
    pub fn push(&self, sub: Submission) -> Receiver<Result<i32>> {
        let (tx, rx) = mpsc::channel();
        let batch = {
            let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
            buffer.pending.push(Pending { sub, tx });
            self.take_ready(&mut buffer)
        };
        if let Some(batch) = batch {
            self.flush(batch);
        }
        rx
    }

    /// No further pushes are expected from intake. Pending tasks flush as
    /// soon as every in-flight task has parked.
    pub fn close(&self) {
        let batch = {
            let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
            buffer.closed = true;
            self.take_ready(&mut buffer)
        };
        if let Some(batch) = batch {
            self.flush(batch);
        }
    }

    /// Re-check the flush condition; called after every task finalization
    /// since a task that failed before parking changes the in-flight
    /// count the close condition depends on.
    pub fn maybe_flush(&self) {
        let batch = {
            let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
            self.take_ready(&mut buffer)
        };
        if let Some(batch) = batch {
            self.flush(batch);
        }
    }

    fn take_ready(&self, buffer: &mut Buffer) -> Option<Vec<Pending>> {
        let full = buffer.pending.len() >= self.k;
        // after close, flush once every remaining in-flight task is
        // parked; nothing else can ever arrive
        let draining = buffer.closed
            && !buffer.pending.is_empty()
            && buffer.pending.len() as u64 == self.stats.in_flight();
        if full || draining {
            Some(std::mem::take(&mut buffer.pending))
        } else {
            None
        }
    }

    fn flush(&self, batch: Vec<Pending>) {
        let subs: Vec<Submission> = batch.iter().map(|p| p.sub.clone()).collect();
        log::debug!("submitting array batch of {}", subs.len());
        match self.executor.submit_array(&subs) {
            Ok(exits) => {
                for (pending, exit) in batch.into_iter().zip(exits) {
                    let _ = pending.tx.send(Ok(exit));
                }
            }
            Err(e) => {
                let msg = format!("{e:#}");
                for pending in batch {
                    let _ = pending.tx.send(Err(anyhow!("array submission failed: {msg}")));
                }
            }
        }
    }
}
