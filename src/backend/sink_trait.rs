//! CommandSink trait for the worker's write side
//!
//! The I/O worker only needs to write lines. Keeping that behind a trait lets
//! the worker drive a real [`ChildProcessSession`](super::ChildProcessSession)
//! in production and a mock in tests.

use crate::error::Result;

/// Destination for command lines
///
/// Implementations must be `Send + Sync` since the sink is shared between the
/// worker thread and the controller that owns the session.
#[cfg_attr(test, mockall::automock)]
pub trait CommandSink: Send + Sync {
    /// Write `line` followed by a newline and flush
    ///
    /// Fails with [`EmbedError::Write`](crate::error::EmbedError::Write) when
    /// the stream is closed or the process has exited.
    fn write_line(&self, line: &str) -> Result<()>;
}
