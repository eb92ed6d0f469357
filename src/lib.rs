//! # plotembed-rs: Embedded plotting tool host
//!
//! Runs an interactive command-line plotting tool (gnuplot by default) as a
//! child process, has it render into a window owned by the host GUI, and
//! feeds it commands typed by the user. The architecture separates the
//! blocking process I/O from the UI thread.
//!
//! ## Architecture
//!
//! - **Surface**: Turns a host window into a [`WindowHandle`] token the tool can attach to
//! - **Backend**: Spawns the tool and writes commands to its stdin on a worker thread
//! - **Controller**: UI-facing state machine (`Idle → Launching → Attached → Terminated`)
//! - **Communication**: A locked FIFO for commands, crossbeam channels for reports
//!
//! ## Configuration
//!
//! The launch profile and worker timing are stored in the platform-appropriate
//! data directory under `dev.hxyulin.plotembed-rs`:
//!
//! - **Linux**: `~/.local/share/dev.hxyulin.plotembed-rs/`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.plotembed-rs/`
//! - **Windows**: `%APPDATA%\dev.hxyulin.plotembed-rs\`
//!
//! ## Example
//!
//! ```ignore
//! use plotembed_rs::{AppConfig, ControllerEvent, EmbeddingController, StaticSurface};
//!
//! let mut controller = EmbeddingController::new(
//!     Box::new(StaticSurface(0xc00007)),
//!     AppConfig::load_or_default(),
//! );
//!
//! // Launch button
//! controller.on_trigger("")?;
//!
//! // Text entry submitted
//! controller.on_trigger("plot sin(x)")?;
//!
//! // Once per UI frame
//! for event in controller.poll_events() {
//!     if let ControllerEvent::Failed { error, .. } = event {
//!         eprintln!("{}", error);
//!     }
//! }
//! ```

pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod surface;
pub mod types;

// Re-export commonly used types
pub use backend::{ChildProcessSession, CommandQueue, IoWorker, LaunchSpec, ReadOutcome};
pub use config::{AppConfig, LaunchProfile, WorkerConfig};
pub use controller::{ControllerEvent, EmbeddingController, TriggerAction};
pub use error::{EmbedError, Result};
pub use surface::{AttachSignal, EmbedSurface, RawSurface, StaticSurface, WindowHandle};
pub use types::{Command, ControllerState, OutputStream};
