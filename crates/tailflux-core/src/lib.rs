//! tailflux Core
//!
//! Core types, traits, and configuration shared by the tailflux stages.

pub mod config;
pub mod descriptor;
pub mod error;
pub mod handoff;
pub mod log_entry;
pub mod traits;

// Re-export commonly used types
pub use config::Config;
pub use descriptor::{ConnectionDescriptor, Precision};
pub use error::{IngestionError, LookupError, OutputError, Result, TailfluxError};
pub use handoff::{handoff, HandoffReceiver, HandoffSender, ReceiverGone};
pub use log_entry::{AccessRecord, LogLine, Point};
pub use traits::{LocationLookup, NoLookup, PointWriter};
