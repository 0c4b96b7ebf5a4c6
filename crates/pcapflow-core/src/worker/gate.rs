//! Start gate for two-phase spawning.
//!
//! Every worker thread initialises itself and then parks on the gate. The
//! builder opens the gate once all workers reported ready, or aborts it if
//! any of them failed; aborted workers return without touching a queue.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Closed,
    Open,
    Aborted,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<GateState>,
    changed: Condvar,
}

/// Shared start gate. Cloning yields another handle to the same gate.
#[derive(Debug, Clone)]
pub struct StartGate {
    inner: Arc<Inner>,
}

impl Default for StartGate {
    fn default() -> Self {
        Self::new()
    }
}

impl StartGate {
    /// Creates a closed gate.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(GateState::Closed),
                changed: Condvar::new(),
            }),
        }
    }

    /// Lets every waiting worker run.
    pub fn open(&self) {
        self.settle(GateState::Open);
    }

    /// Tells every waiting worker to exit.
    pub fn abort(&self) {
        self.settle(GateState::Aborted);
    }

    fn settle(&self, to: GateState) {
        let mut state = self.inner.state.lock();
        if *state == GateState::Closed {
            *state = to;
        }
        self.inner.changed.notify_all();
    }

    /// Blocks until the gate is settled. Returns true if it was opened.
    #[must_use]
    pub fn wait(&self) -> bool {
        let mut state = self.inner.state.lock();
        while *state == GateState::Closed {
            self.inner.changed.wait(&mut state);
        }
        *state == GateState::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_open_releases_waiters() {
        let gate = StartGate::new();
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let gate = gate.clone();
                thread::spawn(move || gate.wait())
            })
            .collect();

        gate.open();
        for waiter in waiters {
            assert!(waiter.join().unwrap());
        }
    }

    #[test]
    fn test_abort_releases_waiters() {
        let gate = StartGate::new();
        let waiter = {
            let gate = gate.clone();
            thread::spawn(move || gate.wait())
        };
        gate.abort();
        assert!(!waiter.join().unwrap());
    }

    #[test]
    fn test_first_settle_wins() {
        let gate = StartGate::new();
        gate.abort();
        gate.open();
        assert!(!gate.wait());
    }
}
