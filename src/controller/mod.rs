//! Embedding controller: the UI-facing state machine
//!
//! The controller ties a [`WindowHandle`], a [`CommandQueue`], a
//! [`ChildProcessSession`] and an [`IoWorker`] together and exposes the hooks
//! the GUI layer calls:
//!
//! - [`EmbeddingController::on_trigger`] - The single launch/send button
//! - [`EmbeddingController::on_launch_triggered`] - Start the foreign process
//! - [`EmbeddingController::on_command_submitted`] - Queue user text
//! - [`EmbeddingController::on_foreign_window_attached`] - Surface reported a plug-in
//! - [`EmbeddingController::stop`] - Tear the session down
//!
//! None of these block on process I/O. Background threads report back over a
//! crossbeam channel, and the UI loop calls [`EmbeddingController::poll_events`]
//! once per frame to apply those reports and collect [`ControllerEvent`]s.
//!
//! # States
//!
//! ```text
//! Idle ──launch──▶ Launching ──attached──▶ Attached ──submit──▶ Attached
//!                      │                       │
//!                      └──exit / write error / stop──▶ Terminated ──launch──▶ Launching
//! ```

pub mod events;

pub use events::{ControllerEvent, ControllerStatus, TriggerAction};

use crate::backend::{ChildProcessSession, CommandQueue, IoWorker, ReadOutcome, SessionEvent};
use crate::config::AppConfig;
use crate::error::{EmbedError, Result, ResultExt};
use crate::surface::{AttachSignal, EmbedSurface, WindowHandle};
use crate::types::{Command, ControllerState, OutputStream};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Everything owned on behalf of one launched process
struct ActiveSession {
    id: u64,
    queue: Arc<CommandQueue>,
    session: Arc<ChildProcessSession>,
    worker: Option<IoWorker>,
    waiter: Option<JoinHandle<()>>,
    attach: AttachSignal,
    launched_at: Instant,
    timeout_reported: bool,
}

/// Why a session is being torn down
enum Teardown {
    Stopped,
    Exited(std::process::ExitStatus),
    Failed(String),
}

/// State machine driving one embedded foreign process at a time
pub struct EmbeddingController {
    surface: Box<dyn EmbedSurface>,
    config: AppConfig,
    state: ControllerState,
    handle: Option<WindowHandle>,
    active: Option<ActiveSession>,
    next_session_id: u64,
    session_tx: Sender<SessionEvent>,
    session_rx: Receiver<SessionEvent>,
    pending: Vec<ControllerEvent>,
    last_undelivered: Vec<Command>,
}

impl EmbeddingController {
    /// Create an idle controller for a surface
    pub fn new(surface: Box<dyn EmbedSurface>, config: AppConfig) -> Self {
        let (session_tx, session_rx) = unbounded();
        Self {
            surface,
            config,
            state: ControllerState::Idle,
            handle: None,
            active: None,
            next_session_id: 1,
            session_tx,
            session_rx,
            pending: Vec::new(),
            last_undelivered: Vec::new(),
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Replace the config used by the next launch
    pub fn set_config(&mut self, config: AppConfig) {
        self.config = config;
    }

    /// Window handle, once acquired
    pub fn window_handle(&self) -> Option<WindowHandle> {
        self.handle
    }

    /// Signal the GUI can fire from its own plug-added callback
    pub fn attach_signal(&self) -> Option<AttachSignal> {
        self.active.as_ref().map(|a| a.attach.clone())
    }

    /// Commands the previous session never delivered
    pub fn last_undelivered(&self) -> &[Command] {
        &self.last_undelivered
    }

    /// Label for the single launch/send trigger
    pub fn trigger_label(&self) -> String {
        let tool = self
            .config
            .launch
            .program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "tool".to_string());

        if self.state.can_launch() {
            format!("Launch {}", tool)
        } else {
            format!("Send command to {}", tool)
        }
    }

    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            state: self.state,
            window_token: self.handle.map(|h| h.token()),
            session_id: self.active.as_ref().map(|a| a.id),
            pid: self.active.as_ref().and_then(|a| a.session.pid()),
            started_at: self.active.as_ref().and_then(|a| a.session.started_at()),
            queued: self.active.as_ref().map_or(0, |a| a.queue.len()),
        }
    }

    /// Single trigger handler: launches when no session is live, otherwise
    /// submits `text` as a command
    pub fn on_trigger(&mut self, text: &str) -> Result<TriggerAction> {
        if self.state.can_launch() {
            self.on_launch_triggered()?;
            Ok(TriggerAction::Launched)
        } else {
            self.on_command_submitted(text)?;
            Ok(TriggerAction::Submitted)
        }
    }

    /// Start a session
    ///
    /// Rejected with [`EmbedError::AlreadyRunning`] while one is live. A spawn
    /// failure moves the controller to `Terminated` and is returned as well as
    /// reported through [`ControllerEvent::Failed`].
    pub fn on_launch_triggered(&mut self) -> Result<()> {
        if self.state.is_live() {
            tracing::warn!("Launch ignored: session already {}", self.state);
            return Err(EmbedError::AlreadyRunning);
        }

        self.config.validate().context("Refusing to launch")?;

        let handle = match self.handle {
            Some(handle) => handle,
            None => {
                let handle = WindowHandle::acquire(self.surface.as_ref())?;
                self.handle = Some(handle);
                handle
            }
        };
        let startup = self.config.launch.startup_commands(&handle)?;

        let id = self.next_session_id;
        self.next_session_id += 1;
        self.set_state(ControllerState::Launching);

        let queue = Arc::new(CommandQueue::new());
        for command in startup {
            queue.push(command);
        }

        let spec = self.config.launch.launch_spec(&handle);
        let session = Arc::new(
            ChildProcessSession::new(spec)
                .with_exit_poll_interval(self.config.worker.exit_poll_interval())
                .with_reader_join_timeout(self.config.worker.reader_join_timeout()),
        );

        if let Err(e) = session.start() {
            return Err(self.fail_launch(id, &queue, &session, e));
        }

        let worker = match IoWorker::spawn(id, queue.clone(), session.clone(), self.session_tx.clone()) {
            Ok(worker) => worker,
            Err(e) => return Err(self.fail_launch(id, &queue, &session, e)),
        };

        let waiter = match spawn_waiter(id, session.clone(), self.session_tx.clone()) {
            Ok(waiter) => waiter,
            Err(e) => {
                queue.cancel();
                let err = self.fail_launch(id, &queue, &session, e);
                drop(worker);
                return Err(err);
            }
        };

        let attach = AttachSignal::new();
        let tx = self.session_tx.clone();
        attach.on_foreign_window_attached(move || {
            let _ = tx.send(SessionEvent::WindowAttached { session_id: id });
        });

        let pid = session.pid().unwrap_or_default();
        tracing::info!("Session {} launched into window {} (pid {})", id, handle, pid);

        self.active = Some(ActiveSession {
            id,
            queue,
            session,
            worker: Some(worker),
            waiter: Some(waiter),
            attach,
            launched_at: Instant::now(),
            timeout_reported: false,
        });
        self.pending.push(ControllerEvent::Launched { session_id: id, pid });
        Ok(())
    }

    /// Queue user text for the running session
    ///
    /// Returns immediately; delivery happens on the I/O worker.
    pub fn on_command_submitted(&mut self, text: &str) -> Result<()> {
        if !self.state.is_live() {
            return Err(EmbedError::NotRunning(self.state));
        }
        let command = Command::new(text)?;

        let active = self
            .active
            .as_ref()
            .ok_or(EmbedError::NotRunning(self.state))?;

        // The worker may have failed and cancelled the queue before its event
        // was applied
        if !active.queue.push(command) {
            return Err(EmbedError::NotRunning(self.state));
        }
        Ok(())
    }

    /// Report that the foreign window was plugged into the surface
    pub fn on_foreign_window_attached(&mut self) {
        match &self.active {
            Some(active) => {
                if !active.attach.notify_attached() {
                    tracing::debug!("Session {} already attached", active.id);
                }
            }
            None => tracing::debug!("Attachment reported with no active session"),
        }
        self.apply_session_events();
    }

    /// Apply background reports and return what happened since the last call
    ///
    /// Never blocks on process I/O. Intended to be called once per UI frame.
    pub fn poll_events(&mut self) -> Vec<ControllerEvent> {
        self.apply_session_events();
        self.check_attach_timeout();
        self.drain_output();
        std::mem::take(&mut self.pending)
    }

    /// Stop the running session, if any
    ///
    /// Closes the queue, terminates the process and joins the background
    /// threads before reporting `Terminated`. Calling it again is a no-op.
    pub fn stop(&mut self) {
        if self.active.is_some() {
            self.teardown(Teardown::Stopped);
        }
    }

    fn set_state(&mut self, to: ControllerState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        tracing::info!("Controller {} -> {}", from, to);
        self.pending.push(ControllerEvent::StateChanged { from, to });
    }

    /// Record a launch that failed before the session went live
    fn fail_launch(
        &mut self,
        id: u64,
        queue: &CommandQueue,
        session: &ChildProcessSession,
        error: EmbedError,
    ) -> EmbedError {
        tracing::error!("Session {} failed to launch: {}", id, error);
        queue.cancel();
        if let Err(e) = session.terminate() {
            tracing::warn!("Cleanup after failed launch: {}", e);
        }

        self.last_undelivered = queue.snapshot();
        self.set_state(ControllerState::Terminated);
        self.pending.push(ControllerEvent::Failed {
            session_id: id,
            error: error.to_string(),
            undelivered: self.last_undelivered.clone(),
        });
        error
    }

    fn apply_session_events(&mut self) {
        while let Ok(event) = self.session_rx.try_recv() {
            let active_id = self.active.as_ref().map(|a| a.id);
            if active_id != Some(event.session_id()) {
                tracing::debug!("Ignoring event from finished session: {:?}", event);
                continue;
            }

            match event {
                SessionEvent::WindowAttached { session_id } => {
                    if self.state == ControllerState::Launching {
                        self.set_state(ControllerState::Attached);
                        self.pending.push(ControllerEvent::Attached { session_id });
                    }
                }
                SessionEvent::ProcessExited { status, .. } => {
                    self.teardown(Teardown::Exited(status));
                }
                SessionEvent::WaitFailed { error, .. } | SessionEvent::WorkerFailed { error, .. } => {
                    self.teardown(Teardown::Failed(error));
                }
            }
        }
    }

    fn check_attach_timeout(&mut self) {
        let Some(timeout) = self.config.worker.attach_timeout() else {
            return;
        };
        if self.state != ControllerState::Launching {
            return;
        }
        let Some(active) = self.active.as_mut() else {
            return;
        };

        let waited = active.launched_at.elapsed();
        if !active.timeout_reported && waited >= timeout {
            active.timeout_reported = true;
            tracing::warn!("Session {}: {}", active.id, EmbedError::AttachmentTimeout(timeout));
            self.pending.push(ControllerEvent::AttachmentTimeout {
                session_id: active.id,
                waited,
            });
        }
    }

    fn drain_output(&mut self) {
        let Some(active) = self.active.as_ref() else {
            return;
        };
        let events = collect_output(&active.session, self.config.worker.output_drain_limit);
        self.pending.extend(events);
    }

    fn teardown(&mut self, reason: Teardown) {
        let Some(mut active) = self.active.take() else {
            return;
        };

        active.queue.cancel();
        let terminated = active.session.terminate();

        // The group kill breaks the pipe under a blocked write; the bound only
        // matters if something outside the group still holds it
        let join_timeout = self.config.worker.worker_join_timeout();
        let worker_exit = active
            .worker
            .take()
            .map(|worker| worker.join_timeout(join_timeout));
        if let Some(waiter) = active.waiter.take() {
            if waiter.join().is_err() {
                tracing::error!("Exit waiter for session {} panicked", active.id);
            }
        }

        // Whatever the process printed before going away
        self.pending
            .extend(collect_output(&active.session, usize::MAX));

        self.last_undelivered = active.queue.snapshot();
        let undelivered = self.last_undelivered.clone();

        let event = match reason {
            Teardown::Failed(error) => ControllerEvent::Failed {
                session_id: active.id,
                error,
                undelivered,
            },
            Teardown::Exited(status) => ControllerEvent::Exited {
                session_id: active.id,
                status: Some(status),
                undelivered,
            },
            Teardown::Stopped => ControllerEvent::Exited {
                session_id: active.id,
                status: terminated.as_ref().ok().copied().flatten(),
                undelivered,
            },
        };

        if let Err(e) = terminated {
            self.pending
                .push(ControllerEvent::Diagnostic(format!("Terminate failed: {}", e)));
        }
        match worker_exit {
            Some(Err(e)) => self.pending.push(ControllerEvent::Diagnostic(e.to_string())),
            Some(Ok(None)) => self.pending.push(ControllerEvent::Diagnostic(format!(
                "I/O worker for session {} did not stop within {:?}",
                active.id, join_timeout
            ))),
            _ => {}
        }

        tracing::info!("Session {} torn down", active.id);
        self.set_state(ControllerState::Terminated);
        self.pending.push(event);
    }
}

impl Drop for EmbeddingController {
    fn drop(&mut self) {
        // Never leave an orphaned foreign process behind
        self.stop();
    }
}

impl std::fmt::Debug for EmbeddingController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingController")
            .field("state", &self.state)
            .field("handle", &self.handle)
            .field("session", &self.active.as_ref().map(|a| a.id))
            .finish()
    }
}

/// Thread that blocks in `wait_for_exit`, collects the output readers and
/// reports the result
fn spawn_waiter(
    id: u64,
    session: Arc<ChildProcessSession>,
    events: Sender<SessionEvent>,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("plotembed-wait-{}", id))
        .spawn(move || {
            let exited = session.wait_for_exit();
            // Off the UI thread, so the tail of the output is in before the
            // exit is reported
            session.join_readers();
            let event = match exited {
                Ok(status) => SessionEvent::ProcessExited {
                    session_id: id,
                    status,
                },
                Err(e) => SessionEvent::WaitFailed {
                    session_id: id,
                    error: e.to_string(),
                },
            };
            let _ = events.send(event);
        })
        .context("Spawning exit waiter")
}

/// Drain up to `limit` chunks per stream into events
fn collect_output(session: &ChildProcessSession, limit: usize) -> Vec<ControllerEvent> {
    let mut events = Vec::new();
    for stream in [OutputStream::Stdout, OutputStream::Stderr] {
        for _ in 0..limit {
            match session.try_read_non_blocking(stream) {
                Ok(ReadOutcome::Data(bytes)) => {
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    tracing::debug!("[{}] {}", stream, text.trim_end());
                    events.push(ControllerEvent::Output { stream, text });
                }
                Ok(ReadOutcome::Pending) | Ok(ReadOutcome::Closed) => break,
                Err(e) => {
                    tracing::warn!("{}", e);
                    events.push(ControllerEvent::Diagnostic(e.to_string()));
                    break;
                }
            }
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LaunchProfile;
    use crate::surface::StaticSurface;

    fn controller_for(program: &str) -> EmbeddingController {
        let config = AppConfig::with_profile(LaunchProfile::for_program(program));
        EmbeddingController::new(Box::new(StaticSurface(0x42)), config)
    }

    struct BrokenSurface;

    impl EmbedSurface for BrokenSurface {
        fn native_window_id(&self) -> Result<u64> {
            Err(EmbedError::UnsupportedSurface("no window yet".to_string()))
        }
    }

    #[test]
    fn test_new_controller_is_idle() {
        let controller = controller_for("cat");
        assert_eq!(controller.state(), ControllerState::Idle);
        assert!(controller.window_handle().is_none());
        assert_eq!(controller.trigger_label(), "Launch cat");
    }

    #[test]
    fn test_submit_while_idle_is_rejected() {
        let mut controller = controller_for("cat");
        assert!(matches!(
            controller.on_command_submitted("plot x"),
            Err(EmbedError::NotRunning(ControllerState::Idle))
        ));
    }

    #[test]
    fn test_spawn_failure_terminates_without_worker() {
        let mut controller = controller_for("/nonexistent/plot-tool");
        let err = controller.on_launch_triggered().unwrap_err();
        assert!(matches!(err, EmbedError::Spawn { .. }));
        assert_eq!(controller.state(), ControllerState::Terminated);
        assert!(controller.active.is_none());

        let events = controller.poll_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, ControllerEvent::Failed { .. })));
        // The setup command never left the queue
        assert_eq!(
            controller.last_undelivered()[0].as_str(),
            "set terminal x11 window \"0x42\""
        );
        // Trigger is launch-capable again
        assert_eq!(controller.trigger_label(), "Launch plot-tool");
    }

    #[test]
    fn test_surface_failure_leaves_controller_idle() {
        let config = AppConfig::with_profile(LaunchProfile::for_program("cat"));
        let mut controller = EmbeddingController::new(Box::new(BrokenSurface), config);
        assert!(matches!(
            controller.on_launch_triggered(),
            Err(EmbedError::UnsupportedSurface(_))
        ));
        assert_eq!(controller.state(), ControllerState::Idle);
    }

    #[test]
    fn test_stop_when_idle_is_noop() {
        let mut controller = controller_for("cat");
        controller.stop();
        controller.stop();
        assert_eq!(controller.state(), ControllerState::Idle);
        assert!(controller.poll_events().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_second_launch_rejected_while_running() {
        let mut controller = controller_for("cat");
        controller.on_launch_triggered().unwrap();
        assert_eq!(controller.state(), ControllerState::Launching);
        assert_eq!(controller.trigger_label(), "Send command to cat");

        assert!(matches!(
            controller.on_launch_triggered(),
            Err(EmbedError::AlreadyRunning)
        ));

        controller.stop();
        assert_eq!(controller.state(), ControllerState::Terminated);
    }

    #[cfg(unix)]
    #[test]
    fn test_attachment_moves_to_attached() {
        let mut controller = controller_for("cat");
        controller.on_launch_triggered().unwrap();

        controller.on_foreign_window_attached();
        assert_eq!(controller.state(), ControllerState::Attached);

        let events = controller.poll_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, ControllerEvent::Attached { session_id: 1 })));

        // Trigger now submits instead of launching
        assert_eq!(controller.on_trigger("plot x").unwrap(), TriggerAction::Submitted);
        controller.stop();
    }
}
