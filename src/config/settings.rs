//! Launch profile and worker timing settings
//!
//! # Main Types
//!
//! - [`LaunchProfile`] - Which foreign tool to start and what to tell it first
//! - [`WorkerConfig`] - Timeouts and polling intervals for the background threads
//!
//! # Window placeholder
//!
//! Both the setup template and the arguments may contain `{window}`, which is
//! replaced by the surface token (e.g. `0xc00007`) at launch time.

use crate::backend::LaunchSpec;
use crate::error::{EmbedError, Result};
use crate::surface::WindowHandle;
use crate::types::{substitute_window, Command};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default foreign tool
pub const DEFAULT_PROGRAM: &str = "gnuplot";

/// Default setup command, pointing an X11 terminal at the embedding window
pub const DEFAULT_SETUP_TEMPLATE: &str = "set terminal x11 window \"{window}\"";

/// Default attachment timeout in milliseconds
pub const DEFAULT_ATTACH_TIMEOUT_MS: u64 = 5_000;

/// Default interval between exit probes in milliseconds
pub const DEFAULT_EXIT_POLL_INTERVAL_MS: u64 = 50;

/// What to launch and how to configure it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchProfile {
    /// Executable name or path
    #[serde(default = "default_program")]
    pub program: PathBuf,

    /// Arguments; `{window}` is substituted
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// First command sent, telling the tool which surface to render into
    #[serde(default = "default_setup_template")]
    pub setup_template: String,

    /// Commands queued right after the setup command
    #[serde(default = "default_initial_commands")]
    pub initial_commands: Vec<String>,

    /// Working directory for the tool
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Extra environment variables
    #[serde(default)]
    pub env: Vec<(String, String)>,
}

fn default_program() -> PathBuf {
    PathBuf::from(DEFAULT_PROGRAM)
}

fn default_args() -> Vec<String> {
    // Keep the plot window alive after the tool exits
    vec!["-p".to_string()]
}

fn default_setup_template() -> String {
    DEFAULT_SETUP_TEMPLATE.to_string()
}

fn default_initial_commands() -> Vec<String> {
    vec!["plot tan(x)".to_string()]
}

impl Default for LaunchProfile {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            setup_template: default_setup_template(),
            initial_commands: default_initial_commands(),
            working_dir: None,
            env: Vec::new(),
        }
    }
}

impl LaunchProfile {
    /// Profile for an arbitrary program with no setup beyond the template
    pub fn for_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            initial_commands: Vec::new(),
            ..Self::default()
        }
    }

    /// Load a profile from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EmbedError::Config(format!("Failed to read profile {:?}: {}", path, e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse a profile from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| EmbedError::Config(format!("Failed to parse profile: {}", e)))
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| EmbedError::Config(format!("Failed to serialize profile: {}", e)))
    }

    /// Build the process launch for a surface
    pub fn launch_spec(&self, handle: &WindowHandle) -> LaunchSpec {
        LaunchSpec {
            program: self.program.clone(),
            args: self
                .args
                .iter()
                .map(|arg| substitute_window(arg, handle))
                .collect(),
            working_dir: self.working_dir.clone(),
            env: self.env.clone(),
        }
    }

    /// Setup command followed by the initial commands, in delivery order
    pub fn startup_commands(&self, handle: &WindowHandle) -> Result<Vec<Command>> {
        let mut commands = Vec::with_capacity(1 + self.initial_commands.len());
        if !self.setup_template.is_empty() {
            commands.push(Command::setup(&self.setup_template, handle)?);
        }
        for text in &self.initial_commands {
            commands.push(Command::new(text.as_str())?);
        }
        Ok(commands)
    }

    /// Check the profile can be launched
    pub fn validate(&self) -> Result<()> {
        if self.program.as_os_str().is_empty() {
            return Err(EmbedError::Config("Launch program is empty".to_string()));
        }
        Command::new(self.setup_template.as_str())
            .map_err(|e| e.with_context("Invalid setup template"))?;
        for text in &self.initial_commands {
            Command::new(text.as_str()).map_err(|e| e.with_context("Invalid initial command"))?;
        }
        Ok(())
    }
}

/// Timing for the background threads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// How long to wait for the foreign window before reporting a timeout
    /// (0 disables the check)
    #[serde(default = "default_attach_timeout_ms")]
    pub attach_timeout_ms: u64,

    /// Interval between exit probes while waiting for the process
    #[serde(default = "default_exit_poll_interval_ms")]
    pub exit_poll_interval_ms: u64,

    /// How long to wait for output readers once the process exited
    #[serde(default = "default_reader_join_timeout_ms")]
    pub reader_join_timeout_ms: u64,

    /// How long teardown waits for a write in progress before detaching the
    /// I/O worker
    #[serde(default = "default_worker_join_timeout_ms")]
    pub worker_join_timeout_ms: u64,

    /// Maximum output chunks drained per stream on each poll
    #[serde(default = "default_output_drain_limit")]
    pub output_drain_limit: usize,
}

fn default_attach_timeout_ms() -> u64 {
    DEFAULT_ATTACH_TIMEOUT_MS
}

fn default_exit_poll_interval_ms() -> u64 {
    DEFAULT_EXIT_POLL_INTERVAL_MS
}

fn default_reader_join_timeout_ms() -> u64 {
    500
}

fn default_worker_join_timeout_ms() -> u64 {
    1000
}

fn default_output_drain_limit() -> usize {
    64
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            attach_timeout_ms: default_attach_timeout_ms(),
            exit_poll_interval_ms: default_exit_poll_interval_ms(),
            reader_join_timeout_ms: default_reader_join_timeout_ms(),
            worker_join_timeout_ms: default_worker_join_timeout_ms(),
            output_drain_limit: default_output_drain_limit(),
        }
    }
}

impl WorkerConfig {
    /// Attachment timeout, if enabled
    pub fn attach_timeout(&self) -> Option<Duration> {
        (self.attach_timeout_ms > 0).then(|| Duration::from_millis(self.attach_timeout_ms))
    }

    pub fn exit_poll_interval(&self) -> Duration {
        Duration::from_millis(self.exit_poll_interval_ms)
    }

    pub fn reader_join_timeout(&self) -> Duration {
        Duration::from_millis(self.reader_join_timeout_ms)
    }

    pub fn worker_join_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_join_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.exit_poll_interval_ms == 0 {
            return Err(EmbedError::Config(
                "exit_poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.output_drain_limit == 0 {
            return Err(EmbedError::Config(
                "output_drain_limit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
