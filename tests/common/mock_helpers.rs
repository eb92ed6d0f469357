//! Mock construction helpers

use plotembed_rs::backend::CommandSink;
use plotembed_rs::{AppConfig, EmbeddingController, Result, StaticSurface};
use parking_lot::Mutex;

/// Window id used throughout the tests
pub const TEST_WINDOW: u64 = 0x42;

/// Controller bound to the test window
pub fn create_test_controller(config: AppConfig) -> EmbeddingController {
    EmbeddingController::new(Box::new(StaticSurface(TEST_WINDOW)), config)
}

/// Sink that records lines instead of writing to a process
#[derive(Default)]
pub struct RecordingSink {
    pub lines: Mutex<Vec<String>>,
}

impl CommandSink for RecordingSink {
    fn write_line(&self, line: &str) -> Result<()> {
        self.lines.lock().push(line.to_string());
        Ok(())
    }
}
