//! Per-process state accounting with single-writer semantics: every
//! transition funnels through one dedicated thread that owns the port
//! bitmap and fires the terminal transition exactly once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use util::PortSet;

use crate::sequencer::Emitter;

/// Counters shared outside the agent, updated synchronously so readers
/// (the array collector, invariant checks) never lag the channel.
#[derive(Debug, Default)]
pub struct ProcStats {
    submitted: AtomicU64,
    completed: AtomicU64,
}

impl ProcStats {
    pub(crate) fn inc_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn inc_completed(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> u64 {
        // submitted is incremented before completed ever can be, so this
        // cannot underflow:
        self.submitted() - self.completed()
    }
}

enum Event {
    Submitted,
    Completed,
    Poison(usize),
    Close,
}

/// Handle for reporting transitions into the agent thread.
#[derive(Clone)]
pub struct StateAgent {
    tx: Sender<Event>,
    stats: Arc<ProcStats>,
}

impl StateAgent {
    pub fn inc_submitted(&self) {
        self.stats.inc_submitted();
        let _ = self.tx.send(Event::Submitted);
    }

    pub fn inc_completed(&self) {
        self.stats.inc_completed();
        let _ = self.tx.send(Event::Completed);
    }

    /// A poison sentinel arrived on input port `i`.
    pub fn poison(&self, port: usize) {
        let _ = self.tx.send(Event::Poison(port));
    }

    /// Intake is over with no more poisons coming (singleton-only
    /// processes); closes every port.
    pub fn close(&self) {
        let _ = self.tx.send(Event::Close);
    }

    pub fn stats(&self) -> &Arc<ProcStats> {
        &self.stats
    }
}

/// Join handle for the agent thread; joins after the terminal transition.
pub struct AgentHandle {
    handle: JoinHandle<()>,
}

impl AgentHandle {
    pub fn join(self) {
        let _ = self.handle.join();
    }
}

/// Spawn the agent. On every event it re-checks the terminal condition
/// (`poisoned ∧ submitted = completed`); when it fires, the emitter binds
/// one poison per output port, `on_terminal` runs (deregistration), and
/// the thread exits.
pub fn spawn(
    n_ports: usize,
    stats: Arc<ProcStats>,
    emitter: Arc<Mutex<Emitter>>,
    on_terminal: impl FnOnce() + Send + 'static,
) -> (StateAgent, AgentHandle) {
    let (tx, rx) = mpsc::channel();
    let agent = StateAgent { tx, stats: stats.clone() };

    let handle = std::thread::spawn(move || {
        let mut open = PortSet::all_open(n_ports);
        let mut poisoned = false;
        let mut on_terminal = Some(on_terminal);

        while let Ok(event) = rx.recv() {
            match event {
                Event::Submitted | Event::Completed => {}
                Event::Poison(port) => {
                    open.close(port);
                    poisoned = true;
                }
                Event::Close => {
                    for i in 0..n_ports {
                        open.close(i);
                    }
                    poisoned = true;
                }
            }

            if poisoned && stats.submitted() == stats.completed() {
                let mut emitter = emitter.lock().unwrap_or_else(|e| e.into_inner());
                emitter.poison_all();
                drop(emitter);
                if let Some(terminal) = on_terminal.take() {
                    terminal();
                }
                return;
            }
        }
        // all senders dropped without a terminal transition; the process
        // was abandoned (session abort) and there is nothing to emit
    });

    (agent, AgentHandle { handle })
}
