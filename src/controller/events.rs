//! Events and status reported by the embedding controller to the UI

use crate::types::{Command, ControllerState, OutputStream};
use chrono::{DateTime, Local};
use std::process::ExitStatus;
use std::time::Duration;

/// Something the UI should react to
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    /// The controller moved to a new state
    StateChanged {
        from: ControllerState,
        to: ControllerState,
    },
    /// The foreign process was started
    Launched { session_id: u64, pid: u32 },
    /// The foreign window is embedded
    Attached { session_id: u64 },
    /// The foreign window has not attached yet; commands still queue
    AttachmentTimeout { session_id: u64, waited: Duration },
    /// Diagnostic output from the foreign process
    Output { stream: OutputStream, text: String },
    /// A non-fatal problem, such as a failed output read
    Diagnostic(String),
    /// The session ended without an error on our side
    Exited {
        session_id: u64,
        status: Option<ExitStatus>,
        undelivered: Vec<Command>,
    },
    /// The session could not start or broke while running
    Failed {
        session_id: u64,
        error: String,
        undelivered: Vec<Command>,
    },
}

impl ControllerEvent {
    /// Whether this event ended a session
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ControllerEvent::Exited { .. } | ControllerEvent::Failed { .. }
        )
    }
}

/// What the single UI trigger did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerAction {
    Launched,
    Submitted,
}

/// Snapshot of the controller for status displays
#[derive(Debug, Clone)]
pub struct ControllerStatus {
    pub state: ControllerState,
    pub window_token: Option<String>,
    pub session_id: Option<u64>,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Local>>,
    pub queued: usize,
}

impl std::fmt::Display for ControllerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.state)?;
        if let Some(token) = &self.window_token {
            write!(f, " window={}", token)?;
        }
        if let (Some(id), Some(pid)) = (self.session_id, self.pid) {
            write!(f, " session={} pid={}", id, pid)?;
        }
        if let Some(started) = self.started_at {
            write!(f, " since {}", started.format("%H:%M:%S"))?;
        }
        if self.queued > 0 {
            write!(f, " queued={}", self.queued)?;
        }
        Ok(())
    }
}
