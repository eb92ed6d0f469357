//! Integration tests for the controller lifecycle
//!
//! These tests validate the state machine against real child processes:
//! - Spawn failures
//! - One live session at a time
//! - Process exit and write failures ending the session
//! - Attachment notification and timeout
//! - Relaunch after termination
//! - Bounded teardown when a grandchild holds the pipes

mod common;

use common::builders::ConfigBuilder;
use common::mock_helpers::create_test_controller;
use plotembed_rs::{ControllerEvent, ControllerState, EmbedError, TriggerAction};
use std::time::{Duration, Instant};

#[test]
fn test_nonexistent_program_terminates_without_worker() {
    let config = ConfigBuilder::new("/nonexistent/dir/gnuplot").build();
    let mut controller = create_test_controller(config);

    let err = controller.on_launch_triggered().unwrap_err();
    assert!(matches!(err, EmbedError::Spawn { .. }));
    assert_eq!(controller.state(), ControllerState::Terminated);
    assert!(controller.status().session_id.is_none());

    let events = controller.poll_events();
    let failed = events
        .iter()
        .find_map(|e| match e {
            ControllerEvent::Failed { error, .. } => Some(error.clone()),
            _ => None,
        })
        .expect("spawn failure should be reported");
    assert!(failed.contains("/nonexistent/dir/gnuplot"));
}

#[test]
#[cfg(unix)]
fn test_second_launch_is_rejected() {
    let mut controller = create_test_controller(ConfigBuilder::new("cat").build());
    controller.on_launch_triggered().unwrap();
    let first = controller.status();

    assert!(matches!(
        controller.on_launch_triggered(),
        Err(EmbedError::AlreadyRunning)
    ));
    // The trigger submits instead of launching a second process
    assert_eq!(controller.on_trigger("plot x").unwrap(), TriggerAction::Submitted);
    assert_eq!(controller.status().pid, first.pid);

    controller.stop();
}

#[test]
#[cfg(unix)]
fn test_process_exit_terminates_session() {
    let config = ConfigBuilder::shell("read line; exit 3").build();
    let mut controller = create_test_controller(config);
    controller.on_launch_triggered().unwrap();

    let events = common::poll_until(&mut controller, ControllerEvent::is_terminal);
    match events.last() {
        Some(ControllerEvent::Exited {
            status: Some(status),
            ..
        }) => assert_eq!(status.code(), Some(3)),
        other => panic!("expected exit event, got {:?}", other),
    }
    assert_eq!(controller.state(), ControllerState::Terminated);

    assert!(matches!(
        controller.on_command_submitted("plot x"),
        Err(EmbedError::NotRunning(ControllerState::Terminated))
    ));
}

#[test]
#[cfg(unix)]
fn test_write_error_terminates_within_bounded_time() {
    // Closes its stdin but stays alive, so only a write can notice
    let config = ConfigBuilder::shell("exec 0<&-; sleep 30")
        .setup_template("")
        .build();
    let mut controller = create_test_controller(config);
    controller.on_launch_triggered().unwrap();

    let started = Instant::now();
    let mut failure = None;
    while failure.is_none() {
        assert!(started.elapsed() < common::test_timeout(), "write error never surfaced");
        let _ = controller.on_command_submitted("plot x");
        for event in controller.poll_events() {
            if let ControllerEvent::Failed { error, undelivered, .. } = event {
                failure = Some((error, undelivered));
            }
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    let (error, undelivered) = failure.unwrap();
    assert!(error.starts_with("Write error"), "{}", error);
    // The command that hit the broken pipe is kept for inspection
    assert!(undelivered.iter().any(|c| c.as_str() == "plot x"));
    assert_eq!(controller.state(), ControllerState::Terminated);
    assert_eq!(controller.last_undelivered(), undelivered.as_slice());
}

#[test]
#[cfg(unix)]
fn test_attachment_notification() {
    let mut controller = create_test_controller(ConfigBuilder::new("cat").build());
    controller.on_launch_triggered().unwrap();

    // The GUI fires the signal from its own plug-added callback
    let signal = controller.attach_signal().unwrap();
    assert!(signal.notify_attached());
    assert!(!signal.notify_attached());

    let events = common::poll_until(&mut controller, |e| {
        matches!(e, ControllerEvent::Attached { .. })
    });
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, ControllerEvent::Attached { .. }))
            .count(),
        1
    );
    assert_eq!(controller.state(), ControllerState::Attached);

    controller.stop();
}

#[test]
#[cfg(unix)]
fn test_attachment_timeout_is_not_fatal() {
    let config = ConfigBuilder::new("cat")
        .setup_template("")
        .attach_timeout_ms(50)
        .build();
    let mut controller = create_test_controller(config);
    controller.on_launch_triggered().unwrap();

    common::poll_until(&mut controller, |e| {
        matches!(e, ControllerEvent::AttachmentTimeout { .. })
    });
    assert_eq!(controller.state(), ControllerState::Launching);

    // Commands are still delivered
    controller.on_command_submitted("plot x").unwrap();
    let events = common::poll_until(&mut controller, |e| {
        matches!(e, ControllerEvent::Output { text, .. } if text.contains("plot x"))
    });
    assert!(!events
        .iter()
        .any(|e| matches!(e, ControllerEvent::AttachmentTimeout { .. })));

    controller.stop();
}

#[test]
#[cfg(unix)]
fn test_stop_is_idempotent_and_relaunch_works() {
    let mut controller = create_test_controller(ConfigBuilder::new("cat").build());
    controller.on_launch_triggered().unwrap();
    let first_pid = controller.status().pid;

    controller.stop();
    assert_eq!(controller.state(), ControllerState::Terminated);
    controller.stop();
    assert_eq!(controller.state(), ControllerState::Terminated);

    let events = controller.poll_events();
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);

    // Trigger is back in launch mode
    assert!(controller.trigger_label().starts_with("Launch"));
    assert_eq!(controller.on_trigger("").unwrap(), TriggerAction::Launched);
    assert_eq!(controller.state(), ControllerState::Launching);
    assert_eq!(controller.status().session_id, Some(2));
    assert_ne!(controller.status().pid, first_pid);

    controller.stop();
}

#[test]
#[cfg(unix)]
fn test_stop_is_bounded_with_blocked_write_and_grandchild() {
    // `sleep` is forked by the shell, inherits stdin and never reads it
    let config = ConfigBuilder::shell("sleep 30; exit 0")
        .setup_template("")
        .build();
    let mut controller = create_test_controller(config);
    controller.on_launch_triggered().unwrap();

    let payload = format!("print '{}'", "x".repeat(4000));
    for _ in 0..64 {
        controller.on_command_submitted(&payload).unwrap();
    }
    // Let the worker fill the pipe and block inside a write
    std::thread::sleep(Duration::from_millis(200));
    assert!(controller.status().queued > 0);

    let started = Instant::now();
    controller.stop();
    let took = started.elapsed();
    assert!(took < Duration::from_secs(2), "stop() took {:?}", took);
    assert_eq!(controller.state(), ControllerState::Terminated);

    let events = controller.poll_events();
    match events.iter().find(|e| e.is_terminal()) {
        Some(ControllerEvent::Exited { undelivered, .. }) => assert!(!undelivered.is_empty()),
        other => panic!("expected exit event, got {:?}", other),
    }
}

#[test]
#[cfg(unix)]
fn test_exit_with_grandchild_holding_output_is_reported() {
    // The background job keeps stdout open after the shell exits
    let config = ConfigBuilder::shell("sleep 30 & read line; exit 4").build();
    let mut controller = create_test_controller(config);
    controller.on_launch_triggered().unwrap();

    // Every frame stays short, including the one that tears the session down
    let deadline = Instant::now() + common::test_timeout();
    let mut slowest = Duration::ZERO;
    let mut terminal = None;
    while terminal.is_none() {
        assert!(Instant::now() < deadline, "exit never reported");
        let frame = Instant::now();
        let events = controller.poll_events();
        slowest = slowest.max(frame.elapsed());
        terminal = events.into_iter().find(ControllerEvent::is_terminal);
        std::thread::sleep(Duration::from_millis(10));
    }

    match terminal {
        Some(ControllerEvent::Exited {
            status: Some(status),
            ..
        }) => assert_eq!(status.code(), Some(4)),
        other => panic!("expected exit event, got {:?}", other),
    }
    assert!(slowest < Duration::from_millis(300), "slowest frame {:?}", slowest);
    assert_eq!(controller.state(), ControllerState::Terminated);
}

#[test]
#[cfg(unix)]
fn test_drop_terminates_foreign_process() {
    let mut controller = create_test_controller(ConfigBuilder::new("sleep").args(&["30"]).build());
    controller.on_launch_triggered().unwrap();
    let pid = controller.status().pid.unwrap();

    drop(controller);

    // Reaped on drop: the pid no longer refers to our child
    let alive = std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .status()
        .map(|s| s.success())
        .unwrap_or(false);
    assert!(!alive);
}
