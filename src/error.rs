//! Error handling for plotembed-rs
//!
//! This module defines the error taxonomy shared by the queue, the child
//! process session, the I/O worker and the embedding controller, plus a
//! Result alias for use throughout the crate.

use crate::types::{ControllerState, OutputStream};
use std::time::Duration;
use thiserror::Error;

/// Main error type for plotembed-rs operations
#[derive(Error, Debug)]
pub enum EmbedError {
    /// The foreign process could not be started
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The foreign process input stream is closed or broken
    #[error("Write error: {0}")]
    Write(String),

    /// Reading diagnostic output failed (distinct from "no data yet")
    #[error("Read error on {stream} ({kind:?}): {message}")]
    Read {
        stream: OutputStream,
        kind: std::io::ErrorKind,
        message: String,
    },

    /// The foreign window never attached to the embedding surface
    #[error("Foreign window did not attach within {0:?}")]
    AttachmentTimeout(Duration),

    /// The session has not been started yet
    #[error("Session has not been started")]
    SessionNotStarted,

    /// A session is already launching or attached
    #[error("A foreign process is already running")]
    AlreadyRunning,

    /// Commands are only accepted while a session is live
    #[error("No foreign process is running (state: {0})")]
    NotRunning(ControllerState),

    /// Command text that cannot be sent as a single line
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// The host surface cannot provide an embeddable window id
    #[error("Unsupported surface: {0}")]
    UnsupportedSurface(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to thread or channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<EmbedError>,
    },
}

impl EmbedError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        EmbedError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error means the session can no longer be used
    pub fn is_session_fatal(&self) -> bool {
        match self {
            EmbedError::Spawn { .. } | EmbedError::Write(_) => true,
            EmbedError::WithContext { source, .. } => source.is_session_fatal(),
            _ => false,
        }
    }
}

/// Result type alias for plotembed-rs operations
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| EmbedError::Io(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| EmbedError::Io(e).with_context(f()))
    }
}
