use chrono::{DateTime, FixedOffset};
use regex::Regex;
use std::sync::OnceLock;
use tailflux_core::AccessRecord;

/// Layout of the bracketed timestamp, e.g. `22/Sep/2022:15:51:16 +0800`
pub const TIMESTAMP_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

static ACCESS_LOG_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_access_log_regex() -> &'static Regex {
    ACCESS_LOG_REGEX.get_or_init(|| {
        // 103.72.172.71 - ying [22/Sep/2022:15:51:16 +0800] "GET /images/06.jpg HTTP/1.1" 304 0 "http://aliyun-chaoyue:8901/" "Mozilla/5.0"
        //   1: client ip, 2: remote identity, 3: timestamp, 4: method, 5: path,
        //   6: protocol, 7: status, 8: bytes, 9: referrer, 10: user agent
        Regex::new(
            r#"^([0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}) - (.*) \[(.*)\] "([^\s]+) ([^\s]+) ([^\s]+?)" ([0-9]{3}) ([0-9]{1,9}) "([^"]*?)" "([^"]*?)""#,
        )
        .unwrap()
    })
}

/// Fields captured from one access-log line, borrowed from the line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine<'a> {
    pub client_ip: &'a str,
    pub identity: &'a str,
    pub timestamp: &'a str,
    pub method: &'a str,
    pub path: &'a str,
    pub protocol: &'a str,
    pub status: &'a str,
    pub bytes: &'a str,
    pub referrer: &'a str,
    pub user_agent: &'a str,
}

impl<'a> ParsedLine<'a> {
    /// The bracketed timestamp, if it is in the usual layout
    pub fn event_time(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_str(self.timestamp, TIMESTAMP_FORMAT).ok()
    }

    /// Build a record with an empty location
    pub fn to_record(&self) -> AccessRecord {
        AccessRecord {
            source_ip: self.client_ip.to_string(),
            source_location: String::new(),
            source_host_info: self.user_agent.to_string(),
            path: self.path.to_string(),
            method: self.method.to_string(),
            scheme: self.protocol.to_string(),
            status: self.status.to_string(),
            event_time: self.event_time(),
        }
    }
}

/// Matches lines in the combined access-log layout
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessLogParser;

impl AccessLogParser {
    pub fn new() -> Self {
        Self
    }

    /// Number of capture groups the grammar defines
    pub fn field_count(&self) -> usize {
        get_access_log_regex().captures_len() - 1
    }

    /// Match `line` against the grammar; `None` when it does not fit
    pub fn parse<'a>(&self, line: &'a str) -> Option<ParsedLine<'a>> {
        let caps = get_access_log_regex().captures(line)?;
        let field = |i: usize| caps.get(i).map(|m| m.as_str());

        Some(ParsedLine {
            client_ip: field(1)?,
            identity: field(2)?,
            timestamp: field(3)?,
            method: field(4)?,
            path: field(5)?,
            protocol: field(6)?,
            status: field(7)?,
            bytes: field(8)?,
            referrer: field(9)?,
            user_agent: field(10)?,
        })
    }
}
