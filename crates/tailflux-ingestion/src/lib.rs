//! tailflux Ingestion
//!
//! Follow-mode reading of a single, live-appended log file.

pub mod file;

pub use file::{FileTail, DEFAULT_POLL_INTERVAL};

use tailflux_core::{handoff, HandoffReceiver, HandoffSender, LogLine};

/// Create the hand-off between the reader and the extractor
pub fn create_line_channel() -> (HandoffSender<LogLine>, HandoffReceiver<LogLine>) {
    handoff()
}
