//! Backend module for driving the foreign process
//!
//! Everything that blocks lives here, off the UI thread: spawning the foreign
//! tool, writing commands into its stdin, reading its diagnostic output and
//! waiting for it to exit.
//!
//! # Architecture
//!
//! The UI thread talks to the backend only through the [`CommandQueue`]:
//!
//! - [`CommandQueue`] - Unbounded FIFO; many producers, one consumer
//! - [`IoWorker`] - The single consumer, writes each command to the session
//! - [`ChildProcessSession`] - Owns the spawned process and its pipes
//! - [`CommandSink`] - Write-side seam between worker and session
//! - [`SessionEvent`] - Messages sent from background threads to the controller
//!
//! # Example
//!
//! ```ignore
//! use plotembed_rs::backend::{ChildProcessSession, CommandQueue, IoWorker, LaunchSpec};
//! use plotembed_rs::types::Command;
//! use std::sync::Arc;
//!
//! let session = Arc::new(ChildProcessSession::new(LaunchSpec::new("gnuplot").arg("-p")));
//! session.start()?;
//!
//! let queue = Arc::new(CommandQueue::new());
//! let (events_tx, events_rx) = crossbeam_channel::unbounded();
//! let worker = IoWorker::spawn(1, queue.clone(), session.clone(), events_tx)?;
//!
//! queue.push(Command::new("plot tan(x)")?);
//! queue.close();
//! worker.join()?;
//! ```

pub mod queue;
pub mod session;
pub mod sink_trait;
pub mod worker;

pub use queue::{CommandQueue, Popped};
pub use session::{ChildProcessSession, LaunchSpec, ReadOutcome, SessionState};
pub use sink_trait::CommandSink;
pub use worker::{IoWorker, WorkerExit};

use std::process::ExitStatus;

/// Message sent from background threads to the embedding controller
///
/// Every event carries the id of the session it belongs to, so events from a
/// previous session can be told apart after a relaunch.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The foreign window was plugged into the surface
    WindowAttached { session_id: u64 },
    /// The foreign process exited on its own or was reaped
    ProcessExited {
        session_id: u64,
        status: ExitStatus,
    },
    /// Waiting for the process failed
    WaitFailed { session_id: u64, error: String },
    /// The I/O worker hit a write error and stopped
    WorkerFailed { session_id: u64, error: String },
}

impl SessionEvent {
    /// Session this event belongs to
    pub fn session_id(&self) -> u64 {
        match self {
            SessionEvent::WindowAttached { session_id }
            | SessionEvent::ProcessExited { session_id, .. }
            | SessionEvent::WaitFailed { session_id, .. }
            | SessionEvent::WorkerFailed { session_id, .. } => *session_id,
        }
    }
}
