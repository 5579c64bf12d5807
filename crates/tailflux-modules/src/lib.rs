//! tailflux Modules
//!
//! Extraction of access-log fields and client location enrichment.

pub mod extractor;
pub mod geo;
pub mod parser;

pub use extractor::{ExtractorStats, RecordExtractor};
pub use geo::{build_lookup, CommandLookup, HttpLookup, INTERNAL_LOCATION, UNKNOWN_LOCATION};
pub use parser::{AccessLogParser, ParsedLine};

use tailflux_core::{handoff, AccessRecord, HandoffReceiver, HandoffSender};

/// Create the hand-off between the extractor and the sink
pub fn create_record_channel(
) -> (HandoffSender<AccessRecord>, HandoffReceiver<AccessRecord>) {
    handoff()
}
