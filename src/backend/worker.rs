//! I/O Worker Thread Implementation
//!
//! This module contains the loop that drains the [`CommandQueue`] into the
//! foreign process' input stream. It runs on its own thread for the lifetime
//! of one session so the UI thread never blocks on process I/O.
//!
//! # Loop
//!
//! - Pop the next command (blocking, no busy-wait)
//! - Write it with a trailing newline through the [`CommandSink`]
//! - On a write failure: put the command back at the head, cancel the queue,
//!   report [`SessionEvent::WorkerFailed`] and stop. No retries.
//! - On [`Popped::Closed`]: stop cleanly

use crate::backend::queue::{CommandQueue, Popped};
use crate::backend::sink_trait::CommandSink;
use crate::backend::SessionEvent;
use crate::error::{EmbedError, Result, ResultExt};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Why the worker loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// The queue was closed or cancelled
    QueueClosed { delivered: u64 },
    /// A write failed and the session is considered broken
    WriteFailed { delivered: u64, error: String },
}

impl WorkerExit {
    /// Number of commands written before the loop ended
    pub fn delivered(&self) -> u64 {
        match self {
            WorkerExit::QueueClosed { delivered } | WorkerExit::WriteFailed { delivered, .. } => {
                *delivered
            }
        }
    }
}

/// Handle to the background thread delivering commands for one session
pub struct IoWorker {
    session_id: u64,
    queue: Arc<CommandQueue>,
    handle: Option<JoinHandle<WorkerExit>>,
    /// Disconnects when the thread ends, panics included
    done: Receiver<()>,
}

impl IoWorker {
    /// Start the worker thread
    pub fn spawn(
        session_id: u64,
        queue: Arc<CommandQueue>,
        sink: Arc<dyn CommandSink>,
        events: Sender<SessionEvent>,
    ) -> Result<Self> {
        let thread_queue = queue.clone();
        let (done_tx, done) = bounded::<()>(0);
        let handle = thread::Builder::new()
            .name(format!("plotembed-io-{}", session_id))
            .spawn(move || {
                let _done = done_tx;
                run(session_id, &thread_queue, sink.as_ref(), &events)
            })
            .context("Spawning I/O worker")?;

        Ok(Self {
            session_id,
            queue,
            handle: Some(handle),
            done,
        })
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Whether the loop has already ended
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Wait for the worker thread to stop
    ///
    /// The caller is expected to have closed or cancelled the queue, or to
    /// know the worker already failed.
    pub fn join(mut self) -> Result<WorkerExit> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| EmbedError::Channel("I/O worker already joined".to_string()))?;

        handle
            .join()
            .map_err(|_| EmbedError::Channel(format!("I/O worker {} panicked", self.session_id)))
    }

    /// Like [`Self::join`], but gives up after `timeout`
    ///
    /// Returns `Ok(None)` and detaches the thread if it is still stuck in a
    /// write by then.
    pub fn join_timeout(mut self, timeout: Duration) -> Result<Option<WorkerExit>> {
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => self.join().map(Some),
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    "I/O worker {} still blocked after {:?}, detaching",
                    self.session_id,
                    timeout
                );
                self.queue.cancel();
                self.handle = None;
                Ok(None)
            }
        }
    }
}

impl Drop for IoWorker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.queue.cancel();
            let _ = handle.join();
        }
    }
}

/// Worker loop body
fn run(
    session_id: u64,
    queue: &CommandQueue,
    sink: &dyn CommandSink,
    events: &Sender<SessionEvent>,
) -> WorkerExit {
    tracing::info!("I/O worker {} started", session_id);
    let mut delivered = 0u64;

    loop {
        match queue.pop_blocking() {
            Popped::Command(command) => match sink.write_line(command.as_str()) {
                Ok(()) => {
                    delivered += 1;
                    tracing::debug!("#{} -> {}", delivered, command);
                }
                Err(e) => {
                    let error = e.to_string();
                    tracing::error!(
                        "I/O worker {} failed writing '{}': {}",
                        session_id,
                        command,
                        error
                    );
                    queue.requeue_front(command);
                    queue.cancel();
                    let _ = events.send(SessionEvent::WorkerFailed {
                        session_id,
                        error: error.clone(),
                    });
                    return WorkerExit::WriteFailed { delivered, error };
                }
            },
            Popped::Closed => {
                tracing::info!(
                    "I/O worker {} stopped after {} command(s)",
                    session_id,
                    delivered
                );
                return WorkerExit::QueueClosed { delivered };
            }
        }
    }
}
