//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use plotembed_rs::{ControllerEvent, EmbeddingController};
use std::time::{Duration, Instant};

/// Upper bound for anything involving a child process
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Poll the controller like a UI loop until `done` sees a matching event
///
/// Returns every event observed. Panics on timeout.
pub fn poll_until<F>(controller: &mut EmbeddingController, mut done: F) -> Vec<ControllerEvent>
where
    F: FnMut(&ControllerEvent) -> bool,
{
    let deadline = Instant::now() + test_timeout();
    let mut seen = Vec::new();
    loop {
        for event in controller.poll_events() {
            let finished = done(&event);
            seen.push(event);
            if finished {
                return seen;
            }
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for controller event; saw {:?}",
            seen
        );
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// Concatenated stdout text from a list of events
pub fn stdout_text(events: &[ControllerEvent]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            ControllerEvent::Output {
                stream: plotembed_rs::OutputStream::Stdout,
                text,
            } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}
