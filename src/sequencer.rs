//! Reorders out-of-order task completions so fair processes emit in
//! tuple order.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::Result;

use process::{OutParamId, OutPort, Value};

use crate::error::TaskError;

/// One task's collected outputs, ready to bind: one slot per output port,
/// None where emission is suppressed (optional output with no matches).
pub type Emission = Vec<(OutParamId, Option<Value>)>;

/// Owns the output ports. Binding is serialized by the mutex wrapping
/// this struct; poison goes out exactly once per port no matter how many
/// times the terminal transition is reported.
pub struct Emitter {
    ports: Vec<OutPort>,
    poisoned: bool,
}

impl Emitter {
    pub fn new(ports: Vec<OutPort>) -> Self {
        Self { ports, poisoned: false }
    }

    pub fn bind(&self, emission: &Emission) {
        for (pid, slot) in emission {
            if let Some(value) = slot {
                self.ports[usize::from(*pid)].send(value.clone());
            }
        }
    }

    pub fn poison_all(&mut self) {
        if self.poisoned {
            return;
        }
        self.poisoned = true;
        for port in &self.ports {
            port.poison();
        }
    }
}

/// Fair processes buffer completions in a sliding window indexed by
/// `tuple_index - next`; unfair processes bind as completions arrive.
pub struct Sequencer {
    fair: bool,
    inner: Mutex<Window>,
}

#[derive(Default)]
struct Window {
    /// Next tuple index to emit.
    next: u64,
    /// One slot per pending tuple; the outer Option marks arrival, the
    /// inner one distinguishes real emissions from suppressed tuples
    /// (ignored failures, false guards) that only advance the watermark.
    buf: VecDeque<Option<Option<Emission>>>,
}

impl Sequencer {
    pub fn new(fair: bool) -> Self {
        Self { fair, inner: Mutex::new(Window::default()) }
    }

    /// Record tuple `tuple_index` as finished. `emission` is None for
    /// tuples that complete without binding anything.
    pub fn emit(
        &self,
        emitter: &Mutex<Emitter>,
        tuple_index: u64,
        emission: Option<Emission>,
    ) -> Result<()> {
        if !self.fair {
            if let Some(em) = emission {
                let emitter = emitter.lock().unwrap_or_else(|e| e.into_inner());
                emitter.bind(&em);
            }
            return Ok(());
        }

        let mut window = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if tuple_index < window.next {
            // a slot below the watermark means the ordering invariant
            // broke upstream; corrupting the buffer silently is worse
            return Err(TaskError::SequenceRegression {
                index: tuple_index,
                watermark: window.next,
            }
            .into());
        }

        let offset = (tuple_index - window.next) as usize;
        if window.buf.len() <= offset {
            window.buf.resize_with(offset + 1, || None);
        }
        window.buf[offset] = Some(emission);

        while matches!(window.buf.front(), Some(Some(_))) {
            let slot = window.buf.pop_front().flatten().flatten();
            window.next += 1;
            if let Some(em) = slot {
                let emitter = emitter.lock().unwrap_or_else(|e| e.into_inner());
                emitter.bind(&em);
            }
        }
        Ok(())
    }
}
