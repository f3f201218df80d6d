//! # Statement Queue
//!
//! FIFO hand-off between callers submitting statements and the single
//! worker draining them. One mutex-guarded state and one condvar; the
//! condvar signals both "work arrived" and "stop requested", so the
//! worker never stays parked through a shutdown.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

struct QueueState {
    pending: VecDeque<String>,
    running: bool,
}

pub struct StatementQueue {
    state: Mutex<QueueState>,
    signal: Condvar,
}

impl StatementQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                running: false,
            }),
            signal: Condvar::new(),
        }
    }

    /// Appends a statement. Submissions that are empty or whitespace-only
    /// are dropped; everything else is stored exactly as submitted.
    pub fn enqueue(&self, statement: impl Into<String>) {
        let statement = statement.into();
        if statement.trim().is_empty() {
            trace!("dropping blank submission");
            return;
        }
        let mut state = self.state.lock();
        state.pending.push_back(statement);
        self.signal.notify_one();
    }

    /// Removes and returns the oldest pending statement.
    ///
    /// There is no blocking pop; the consumer wakes via [`wait_for_signal`]
    /// and polls [`is_empty`] before calling this. Dequeuing from an empty
    /// queue is a contract violation and panics.
    ///
    /// [`wait_for_signal`]: StatementQueue::wait_for_signal
    /// [`is_empty`]: StatementQueue::is_empty
    pub fn dequeue(&self) -> String {
        self.state
            .lock()
            .pending
            .pop_front()
            .expect("dequeue called on an empty queue")
    }

    /// Blocks until a statement is pending or a stop was requested.
    pub fn wait_for_signal(&self) {
        let mut state = self.state.lock();
        while state.running && state.pending.is_empty() {
            self.signal.wait(&mut state);
        }
    }

    pub fn mark_running(&self) {
        self.state.lock().running = true;
    }

    /// Flags the queue as stopping and wakes a parked worker. Pending
    /// statements are left in place.
    pub fn request_stop(&self) {
        self.state.lock().running = false;
        self.signal.notify_all();
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }
}

impl Default for StatementQueue {
    fn default() -> Self {
        Self::new()
    }
}
