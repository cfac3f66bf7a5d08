use std::sync::mpsc;

use crate::Value;

/// One message on a process channel: a value, or the sentinel that closes
/// the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Value(Value),
    Poison,
}

/// Sending half of a channel. Emission order is the responsibility of the
/// caller (the sequencer serializes binds for fair processes).
#[derive(Debug, Clone)]
pub struct OutPort {
    tx: mpsc::Sender<Message>,
}

impl OutPort {
    pub fn send(&self, value: Value) {
        // a dropped receiver means downstream already terminated; emission
        // to it is a no-op rather than an error:
        let _ = self.tx.send(Message::Value(value));
    }

    pub fn poison(&self) {
        let _ = self.tx.send(Message::Poison);
    }
}

/// Receiving half of a channel, as seen by an operator's intake loop.
#[derive(Debug)]
pub struct InPort {
    rx: mpsc::Receiver<Message>,
}

impl InPort {
    /// Block until the next message. A disconnected sender counts as
    /// poison: the upstream operator is gone, so the stream has ended.
    pub fn recv(&self) -> Message {
        self.rx.recv().unwrap_or(Message::Poison)
    }

    /// Non-blocking variant, for draining in tests.
    pub fn try_recv(&self) -> Option<Message> {
        self.rx.try_recv().ok()
    }
}

/// Create a connected port pair.
pub fn channel() -> (OutPort, InPort) {
    let (tx, rx) = mpsc::channel();
    (OutPort { tx }, InPort { rx })
}
