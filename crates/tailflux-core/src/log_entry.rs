use chrono::{DateTime, FixedOffset, Utc};
use std::borrow::Cow;

/// One raw line read from the followed file, newline stripped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Raw bytes of the line
    pub content: Vec<u8>,
}

impl LogLine {
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// Line content decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Structured access-log record produced by the extractor
///
/// The write-time timestamp is not part of the record; the sink stamps it
/// when the record is turned into a point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRecord {
    /// Dotted-quad client address
    pub source_ip: String,

    /// Place name resolved from `source_ip`, empty when the lookup failed
    pub source_location: String,

    /// Client user-agent
    pub source_host_info: String,

    pub path: String,
    pub method: String,
    pub scheme: String,
    pub status: String,

    /// Timestamp carried in the log line itself, when it parses
    pub event_time: Option<DateTime<FixedOffset>>,
}

impl AccessRecord {
    /// Set the resolved location
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.source_location = location.into();
        self
    }
}

/// A tagged, fielded measurement ready for the time-series store
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,

    /// Indexed dimensions, kept in insertion order
    pub tags: Vec<(String, String)>,

    /// Stored string values, kept in insertion order
    pub fields: Vec<(String, String)>,

    pub timestamp: DateTime<Utc>,
}

impl Point {
    pub fn new(measurement: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: Vec::new(),
            fields: Vec::new(),
            timestamp,
        }
    }

    /// Add a tag
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    /// Add a field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }
}
