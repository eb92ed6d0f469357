//! Core data types for plotembed-rs
//!
//! This module contains the vocabulary shared between the UI-facing
//! controller and the background threads:
//!
//! - [`Command`] - One line of text for the foreign process
//! - [`ControllerState`] - Lifecycle of the embedding controller
//! - [`OutputStream`] - Which diagnostic stream of the child is meant

use crate::error::{EmbedError, Result};
use crate::surface::WindowHandle;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder substituted with the window token in templates and arguments
pub const WINDOW_PLACEHOLDER: &str = "{window}";

/// A single instruction for the foreign process
///
/// Commands are stored without their line terminator. The worker appends the
/// newline when writing, so the text itself must never contain one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Command(String);

impl Command {
    /// Create a command from user text
    ///
    /// A single trailing `\n` or `\r\n` is stripped. Any other line break is
    /// rejected since it would split the command on the wire.
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let mut text = text.into();
        if text.ends_with('\n') {
            text.pop();
            if text.ends_with('\r') {
                text.pop();
            }
        }

        if text.contains(['\n', '\r']) {
            return Err(EmbedError::InvalidCommand(format!(
                "command must be a single line: {:?}",
                text
            )));
        }

        Ok(Self(text))
    }

    /// Render the setup command that points the foreign tool at a surface
    pub fn setup(template: &str, handle: &WindowHandle) -> Result<Self> {
        Self::new(substitute_window(template, handle))
    }

    /// The command text, without newline
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the command, returning the text
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Command {
    type Error = EmbedError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Command> for String {
    fn from(cmd: Command) -> Self {
        cmd.0
    }
}

impl AsRef<str> for Command {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Replace every `{window}` placeholder with the handle's token
pub fn substitute_window(template: &str, handle: &WindowHandle) -> String {
    template.replace(WINDOW_PLACEHOLDER, &handle.token())
}

/// Lifecycle state of the embedding controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ControllerState {
    /// No session has been launched yet
    #[default]
    Idle,
    /// Process started, foreign window not yet confirmed
    Launching,
    /// Process running and its window is embedded
    Attached,
    /// Session ended or was stopped
    Terminated,
}

impl ControllerState {
    /// Whether a session is live and accepting commands
    pub fn is_live(&self) -> bool {
        matches!(self, ControllerState::Launching | ControllerState::Attached)
    }

    /// Whether the trigger should launch a new session
    pub fn can_launch(&self) -> bool {
        matches!(self, ControllerState::Idle | ControllerState::Terminated)
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerState::Idle => write!(f, "Idle"),
            ControllerState::Launching => write!(f, "Launching..."),
            ControllerState::Attached => write!(f, "Attached"),
            ControllerState::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Readable streams of the foreign process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputStream::Stdout => write!(f, "stdout"),
            OutputStream::Stderr => write!(f, "stderr"),
        }
    }
}
