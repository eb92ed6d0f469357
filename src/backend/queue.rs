//! Command queue between UI producers and the I/O worker
//!
//! An unbounded FIFO guarded by a `parking_lot` mutex and condvar. Any number
//! of threads may push; exactly one worker pops.
//!
//! Closing is the cancellation primitive for the worker and comes in two
//! strengths:
//!
//! - [`CommandQueue::close`] refuses further pushes; the worker still drains
//!   what was queued before the close, then sees [`Popped::Closed`].
//! - [`CommandQueue::cancel`] also closes, but the worker sees
//!   [`Popped::Closed`] right away. Commands left behind stay queued and can be
//!   inspected through [`CommandQueue::snapshot`]; they are never delivered.

use crate::types::Command;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// Result of a blocking pop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Popped {
    /// Next command in FIFO order
    Command(Command),
    /// The queue was closed; no more commands will arrive
    Closed,
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<Command>,
    closed: bool,
    cancelled: bool,
}

/// Thread-safe unbounded FIFO of commands
#[derive(Debug, Default)]
pub struct CommandQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl CommandQueue {
    /// Create an empty, open queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command to the tail without blocking
    ///
    /// Returns `false` if the queue is closed; the command is not stored.
    pub fn push(&self, command: Command) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            tracing::warn!("Dropping command pushed after close: {}", command);
            return false;
        }
        state.items.push_back(command);
        drop(state);

        self.available.notify_one();
        true
    }

    /// Block until a command is available or the queue is finished
    ///
    /// Intended for the single I/O worker. Returns [`Popped::Closed`] once the
    /// queue is closed and drained, or as soon as it is cancelled.
    pub fn pop_blocking(&self) -> Popped {
        let mut state = self.state.lock();
        loop {
            if state.cancelled {
                return Popped::Closed;
            }
            if let Some(command) = state.items.pop_front() {
                return Popped::Command(command);
            }
            if state.closed {
                return Popped::Closed;
            }
            self.available.wait(&mut state);
        }
    }

    /// Pop without blocking; `None` means nothing is ready yet
    pub fn try_pop(&self) -> Option<Popped> {
        let mut state = self.state.lock();
        if state.cancelled {
            return Some(Popped::Closed);
        }
        match state.items.pop_front() {
            Some(command) => Some(Popped::Command(command)),
            None if state.closed => Some(Popped::Closed),
            None => None,
        }
    }

    /// Put a command back at the head
    ///
    /// Used when a popped command could not be written, so it shows up in the
    /// snapshot. Works on a closed queue as well.
    pub fn requeue_front(&self, command: Command) {
        self.state.lock().items.push_front(command);
    }

    /// Signal that no more commands will be pushed
    ///
    /// Already queued commands are still handed to the consumer. Closing twice
    /// is a no-op; returns whether this call performed the close.
    pub fn close(&self) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.closed = true;
        let pending = state.items.len();
        drop(state);

        tracing::debug!("Command queue closed with {} command(s) left to drain", pending);
        self.available.notify_all();
        true
    }

    /// Close the queue and stop handing out commands immediately
    ///
    /// Idempotent; returns whether this call performed the cancellation.
    pub fn cancel(&self) -> bool {
        let mut state = self.state.lock();
        if state.cancelled {
            return false;
        }
        state.closed = true;
        state.cancelled = true;
        let pending = state.items.len();
        drop(state);

        if pending > 0 {
            tracing::debug!("Command queue cancelled with {} undelivered command(s)", pending);
        }
        self.available.notify_all();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Copy of the queued commands, head first
    pub fn snapshot(&self) -> Vec<Command> {
        self.state.lock().items.iter().cloned().collect()
    }

    /// Remove and return all queued commands
    pub fn drain_remaining(&self) -> Vec<Command> {
        self.state.lock().items.drain(..).collect()
    }
}
