use crate::parser::AccessLogParser;
use std::sync::Arc;
use std::time::Duration;
use tailflux_core::{
    AccessRecord, HandoffReceiver, HandoffSender, LocationLookup, LogLine, LookupError,
    TailfluxError,
};
use tracing::{debug, info, warn};

/// Counters kept by the extractor over its lifetime
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractorStats {
    pub lines: u64,
    pub records: u64,
    pub unmatched: u64,
    pub lookup_failures: u64,
}

/// Turns raw lines into enriched access records
///
/// Lines are handled strictly one at a time. A line that does not match the
/// grammar is dropped with a warning. A failed or slow location lookup only
/// leaves the location empty; the record is still produced.
pub struct RecordExtractor {
    parser: AccessLogParser,
    lookup: Arc<dyn LocationLookup>,
    lookup_timeout: Duration,
    stats: ExtractorStats,
}

impl RecordExtractor {
    pub fn new(lookup: Arc<dyn LocationLookup>, lookup_timeout: Duration) -> Self {
        Self {
            parser: AccessLogParser::new(),
            lookup,
            lookup_timeout,
            stats: ExtractorStats::default(),
        }
    }

    pub fn stats(&self) -> ExtractorStats {
        self.stats
    }

    /// Extract a record from one line, or nothing if it does not match
    pub async fn extract(&mut self, line: &LogLine) -> Option<AccessRecord> {
        self.stats.lines += 1;
        let text = line.text();

        let record = match self.parser.parse(&text) {
            Some(parsed) => parsed.to_record(),
            None => {
                self.stats.unmatched += 1;
                warn!(line = %text, "Line does not match access log format, dropping");
                return None;
            }
        };

        let location = match self.resolve_location(&record.source_ip).await {
            Ok(location) => location,
            Err(e) => {
                self.stats.lookup_failures += 1;
                warn!(
                    ip = %record.source_ip,
                    lookup = self.lookup.name(),
                    error = %e,
                    "Location lookup failed, continuing without location"
                );
                String::new()
            }
        };

        self.stats.records += 1;
        Some(record.with_location(location))
    }

    async fn resolve_location(&self, ip: &str) -> Result<String, LookupError> {
        match tokio::time::timeout(self.lookup_timeout, self.lookup.lookup(ip)).await {
            Ok(result) => result,
            Err(_) => Err(LookupError::Timeout(self.lookup_timeout.as_millis() as u64)),
        }
    }

    /// Consume lines until the input closes, sending each record downstream
    pub async fn run(
        mut self,
        mut receiver: HandoffReceiver<LogLine>,
        sender: HandoffSender<AccessRecord>,
    ) -> Result<ExtractorStats, TailfluxError> {
        info!(lookup = self.lookup.name(), "Record extractor started");

        while let Some(line) = receiver.recv().await {
            let Some(record) = self.extract(&line).await else {
                continue;
            };

            debug!(ip = %record.source_ip, path = %record.path, "Extracted record");
            if sender.send(record).await.is_err() {
                warn!("Channel closed, stopping record extractor");
                return Err(TailfluxError::HandoffClosed("extractor"));
            }
        }

        info!(
            lines = self.stats.lines,
            records = self.stats.records,
            unmatched = self.stats.unmatched,
            lookup_failures = self.stats.lookup_failures,
            "Record extractor stopped"
        );
        Ok(self.stats)
    }
}
