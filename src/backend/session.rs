//! Lifecycle of one spawned foreign process
//!
//! A [`ChildProcessSession`] spawns the foreign tool with piped stdio and owns
//! those pipes for the rest of the process' life:
//!
//! - **stdin** is written only through [`ChildProcessSession::write_line`],
//!   which the I/O worker calls. A write blocked on a full pipe never holds
//!   the slot lock, so [`ChildProcessSession::close_input`] and
//!   [`ChildProcessSession::terminate`] return without waiting for it.
//! - **stdout/stderr** are each read by one dedicated reader thread that
//!   forwards chunks over a crossbeam channel. The UI side polls them with
//!   [`ChildProcessSession::try_read_non_blocking`], which never blocks and
//!   tells "no data yet", "end of stream" and "read failed" apart.
//!
//! # States
//!
//! `NotStarted` → `Running` (after a successful spawn) → `Exited(status)`
//! (once the exit status has been reaped by `try_wait`, `wait_for_exit` or
//! `terminate`).
//!
//! On Unix the tool is started in its own process group, and `terminate`
//! kills the whole group so helpers the tool forked (a shell's children,
//! gnuplot's X11 driver) release the pipes too.

use crate::backend::sink_trait::CommandSink;
use crate::error::{EmbedError, Result, ResultExt};
use crate::types::OutputStream;
use chrono::{DateTime, Local};
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Size of a single read from an output pipe
const READ_CHUNK_SIZE: usize = 4096;

/// How to start the foreign process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpec {
    /// Executable name or path
    pub program: PathBuf,
    /// Arguments, already rendered
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory (inherits the host's when unset)
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables
    #[serde(default)]
    pub env: Vec<(String, String)>,
}

impl LaunchSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Human-readable command line for logs
    pub fn display(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    NotStarted,
    Running,
    Exited(ExitStatus),
}

/// Result of a non-blocking read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Bytes read from the stream
    Data(Vec<u8>),
    /// Nothing available right now
    Pending,
    /// The stream reached end of file
    Closed,
}

/// Message from a reader thread
#[derive(Debug)]
enum ReadChunk {
    Data(Vec<u8>),
    Failed(std::io::ErrorKind, String),
}

#[derive(Default)]
struct SessionInner {
    state: SessionState,
    child: Option<Child>,
    pid: Option<u32>,
    started_at: Option<DateTime<Local>>,
    readers: Vec<JoinHandle<()>>,
    group_killed: bool,
}

#[derive(Default)]
struct OutputChannels {
    stdout: Option<Receiver<ReadChunk>>,
    stderr: Option<Receiver<ReadChunk>>,
}

impl OutputChannels {
    fn get(&self, stream: OutputStream) -> Option<&Receiver<ReadChunk>> {
        match stream {
            OutputStream::Stdout => self.stdout.as_ref(),
            OutputStream::Stderr => self.stderr.as_ref(),
        }
    }
}

/// One live foreign process and its stdio pipes
pub struct ChildProcessSession {
    spec: LaunchSpec,
    exit_poll_interval: Duration,
    reader_join_timeout: Duration,
    inner: Mutex<SessionInner>,
    stdin: Mutex<Option<Arc<ChildStdin>>>,
    /// Serializes writers; never taken by teardown
    write_lock: Mutex<()>,
    outputs: Mutex<OutputChannels>,
}

impl ChildProcessSession {
    /// Create a session that has not been started yet
    pub fn new(spec: LaunchSpec) -> Self {
        Self {
            spec,
            exit_poll_interval: Duration::from_millis(50),
            reader_join_timeout: Duration::from_millis(500),
            inner: Mutex::new(SessionInner::default()),
            stdin: Mutex::new(None),
            write_lock: Mutex::new(()),
            outputs: Mutex::new(OutputChannels::default()),
        }
    }

    /// Interval used by [`Self::wait_for_exit`] between exit probes
    pub fn with_exit_poll_interval(mut self, interval: Duration) -> Self {
        self.exit_poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// How long [`Self::join_readers`] waits for the reader threads to finish
    pub fn with_reader_join_timeout(mut self, timeout: Duration) -> Self {
        self.reader_join_timeout = timeout;
        self
    }

    /// Spawn the foreign process
    ///
    /// Returns once the OS has confirmed the process started. The OS failure
    /// reason is kept in [`EmbedError::Spawn`].
    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::NotStarted {
            return Err(EmbedError::AlreadyRunning);
        }

        let mut command = std::process::Command::new(&self.spec.program);
        command
            .args(&self.spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.spec.working_dir {
            command.current_dir(dir);
        }
        command.envs(self.spec.env.iter().map(|(k, v)| (k, v)));
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command.spawn().map_err(|source| {
            tracing::error!("Failed to spawn {}: {}", self.spec.display(), source);
            EmbedError::Spawn {
                program: self.spec.program.display().to_string(),
                source,
            }
        })?;

        let pid = child.id();
        let stdin = child.stdin.take().map(Arc::new);
        let mut channels = OutputChannels::default();
        let mut readers = Vec::with_capacity(2);

        let spawned = (|| -> Result<()> {
            if let Some(stdout) = child.stdout.take() {
                let (rx, handle) = spawn_reader(OutputStream::Stdout, pid, stdout)?;
                channels.stdout = Some(rx);
                readers.push(handle);
            }
            if let Some(stderr) = child.stderr.take() {
                let (rx, handle) = spawn_reader(OutputStream::Stderr, pid, stderr)?;
                channels.stderr = Some(rx);
                readers.push(handle);
            }
            Ok(())
        })();

        if let Err(e) = spawned {
            // Process is useless without its readers
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }

        *self.stdin.lock() = stdin;
        *self.outputs.lock() = channels;

        inner.child = Some(child);
        inner.pid = Some(pid);
        inner.started_at = Some(Local::now());
        inner.readers = readers;
        inner.state = SessionState::Running;

        tracing::info!("Started {} (pid {})", self.spec.display(), pid);
        Ok(())
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// OS process id, once started
    pub fn pid(&self) -> Option<u32> {
        self.inner.lock().pid
    }

    pub fn started_at(&self) -> Option<DateTime<Local>> {
        self.inner.lock().started_at
    }

    pub fn spec(&self) -> &LaunchSpec {
        &self.spec
    }

    /// Write `text` plus a newline to the process input and flush
    pub fn write_line(&self, text: &str) -> Result<()> {
        match self.state() {
            SessionState::Running => {}
            SessionState::NotStarted => {
                return Err(EmbedError::Write("session has not been started".to_string()))
            }
            SessionState::Exited(status) => {
                return Err(EmbedError::Write(format!("process already exited ({})", status)))
            }
        }

        let _writer = self.write_lock.lock();
        let pipe = self
            .stdin
            .lock()
            .clone()
            .ok_or_else(|| EmbedError::Write("input stream is closed".to_string()))?;

        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');

        let mut writer = &*pipe;
        if let Err(e) = writer.write_all(line.as_bytes()).and_then(|_| writer.flush()) {
            // A broken pipe stays broken
            let mut slot = self.stdin.lock();
            if slot.as_ref().is_some_and(|p| Arc::ptr_eq(p, &pipe)) {
                *slot = None;
            }
            return Err(EmbedError::Write(e.to_string()));
        }
        Ok(())
    }

    /// Read whatever output is available without blocking
    ///
    /// A failed read on the pipe is an error, not an empty result.
    pub fn try_read_non_blocking(&self, stream: OutputStream) -> Result<ReadOutcome> {
        let received = self.outputs.lock().get(stream).map(|rx| rx.try_recv());
        let Some(received) = received else {
            return match self.state() {
                SessionState::NotStarted => Ok(ReadOutcome::Pending),
                _ => Ok(ReadOutcome::Closed),
            };
        };

        match received {
            Ok(ReadChunk::Data(bytes)) => Ok(ReadOutcome::Data(bytes)),
            Ok(ReadChunk::Failed(kind, message)) => Err(EmbedError::Read {
                stream,
                kind,
                message,
            }),
            Err(TryRecvError::Empty) => Ok(ReadOutcome::Pending),
            Err(TryRecvError::Disconnected) => Ok(ReadOutcome::Closed),
        }
    }

    /// Probe for exit without blocking
    pub fn try_wait(&self) -> Result<Option<ExitStatus>> {
        let mut inner = self.inner.lock();
        match inner.state {
            SessionState::Exited(status) => return Ok(Some(status)),
            SessionState::NotStarted => return Err(EmbedError::SessionNotStarted),
            SessionState::Running => {}
        }

        let Some(child) = inner.child.as_mut() else {
            return Err(EmbedError::SessionNotStarted);
        };

        match child.try_wait().context("Polling foreign process")? {
            Some(status) => {
                inner.state = SessionState::Exited(status);
                tracing::info!("Foreign process {} exited: {}", self.spec.display(), status);
                Ok(Some(status))
            }
            None => Ok(None),
        }
    }

    /// Block the calling thread until the process exits
    pub fn wait_for_exit(&self) -> Result<ExitStatus> {
        loop {
            if let Some(status) = self.try_wait()? {
                return Ok(status);
            }
            thread::sleep(self.exit_poll_interval);
        }
    }

    /// Close the input stream so the process sees end of file
    ///
    /// Never waits for a write in progress; the descriptor is released once
    /// that write returns.
    pub fn close_input(&self) {
        if self.stdin.lock().take().is_some() {
            tracing::debug!("Closed input of {}", self.spec.display());
        }
    }

    /// Request termination and reap the process
    ///
    /// Best-effort and idempotent: a session that already exited just has its
    /// leftover process group killed and its input closed. Returns the exit
    /// status if the process ever ran. Output readers are not joined here; see
    /// [`Self::join_readers`].
    pub fn terminate(&self) -> Result<Option<ExitStatus>> {
        let status = {
            let mut inner = self.inner.lock();
            if let (Some(pid), false) = (inner.pid, inner.group_killed) {
                inner.group_killed = true;
                kill_process_group(pid);
            }

            match inner.state {
                SessionState::NotStarted => return Ok(None),
                SessionState::Exited(status) => status,
                SessionState::Running => {
                    let child = inner.child.as_mut().ok_or(EmbedError::SessionNotStarted)?;
                    if let Err(e) = child.kill() {
                        // Already gone between the last probe and now
                        tracing::debug!("kill() on pid {} failed: {}", child.id(), e);
                    }
                    let status = child.wait().context("Reaping foreign process")?;
                    inner.state = SessionState::Exited(status);
                    tracing::info!("Terminated {} ({})", self.spec.display(), status);
                    status
                }
            }
        };

        self.close_input();
        Ok(Some(status))
    }

    /// Wait, up to the reader join timeout, for both output readers to reach
    /// end of stream
    ///
    /// Readers still blocked after that are detached. Call this from a
    /// background thread once the process has exited.
    pub fn join_readers(&self) {
        let readers = std::mem::take(&mut self.inner.lock().readers);
        if readers.is_empty() {
            return;
        }

        let deadline = Instant::now() + self.reader_join_timeout;
        for handle in readers {
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                // A grandchild still holds the pipe open
                tracing::warn!(
                    "Output reader for {} still blocked after {:?}, detaching",
                    self.spec.display(),
                    self.reader_join_timeout
                );
            }
        }
    }
}

impl CommandSink for ChildProcessSession {
    fn write_line(&self, line: &str) -> Result<()> {
        ChildProcessSession::write_line(self, line)
    }
}

impl Drop for ChildProcessSession {
    fn drop(&mut self) {
        if self.state() == SessionState::Running {
            if let Err(e) = self.terminate() {
                tracing::warn!("Failed to terminate {} on drop: {}", self.spec.display(), e);
            }
        }
    }
}

impl std::fmt::Debug for ChildProcessSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ChildProcessSession")
            .field("spec", &self.spec)
            .field("state", &inner.state)
            .field("pid", &inner.pid)
            .finish()
    }
}

/// Kill every process in the group led by `pid`
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let Ok(pgid) = i32::try_from(pid) else {
        return;
    };
    // SAFETY: plain syscall on a group this session created at spawn
    let result = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if result != 0 {
        let err = std::io::Error::last_os_error();
        // Group already empty
        if err.raw_os_error() != Some(libc::ESRCH) {
            tracing::debug!("kill(-{}) failed: {}", pgid, err);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

/// Spawn the thread that owns one output pipe
fn spawn_reader<R>(
    stream: OutputStream,
    pid: u32,
    reader: R,
) -> Result<(Receiver<ReadChunk>, JoinHandle<()>)>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = unbounded();
    let handle = thread::Builder::new()
        .name(format!("plotembed-{}-{}", stream, pid))
        .spawn(move || read_loop(reader, tx))
        .with_context(|| format!("Spawning {} reader", stream))?;
    Ok((rx, handle))
}

fn read_loop<R: Read>(mut reader: R, tx: Sender<ReadChunk>) {
    let mut buf = [0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(ReadChunk::Data(buf[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = tx.send(ReadChunk::Failed(e.kind(), e.to_string()));
                break;
            }
        }
    }
    // Dropping tx marks the stream closed for the polling side
}
