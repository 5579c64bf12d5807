use crate::error::OutputError;
use std::fmt;
use std::str::FromStr;

/// Separator between descriptor components
pub const DESCRIPTOR_SEPARATOR: char = '@';

/// Timestamp precision accepted by the time-series store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
}

impl Precision {
    /// Query-string form understood by the store
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Nanoseconds => "ns",
            Precision::Microseconds => "u",
            Precision::Milliseconds => "ms",
            Precision::Seconds => "s",
            Precision::Minutes => "m",
            Precision::Hours => "h",
        }
    }
}

impl FromStr for Precision {
    type Err = OutputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "n" | "ns" => Ok(Precision::Nanoseconds),
            "u" | "us" => Ok(Precision::Microseconds),
            "ms" => Ok(Precision::Milliseconds),
            "s" => Ok(Precision::Seconds),
            "m" => Ok(Precision::Minutes),
            "h" => Ok(Precision::Hours),
            other => Err(OutputError::Descriptor(format!(
                "unknown precision '{}', expected one of n, ns, u, ms, s, m, h",
                other
            ))),
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection parameters for the time-series store
///
/// Written as `endpoint@username@password@database@precision@measurement`.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub database: String,
    pub precision: Precision,
    pub measurement: String,
}

impl FromStr for ConnectionDescriptor {
    type Err = OutputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(DESCRIPTOR_SEPARATOR).collect();
        if parts.len() != 6 {
            return Err(OutputError::Descriptor(format!(
                "expected 6 '{}'-separated components, found {}",
                DESCRIPTOR_SEPARATOR,
                parts.len()
            )));
        }

        let endpoint = parts[0].trim_end_matches('/');
        if endpoint.is_empty() {
            return Err(OutputError::Descriptor("endpoint is empty".to_string()));
        }
        if parts[3].is_empty() {
            return Err(OutputError::Descriptor("database is empty".to_string()));
        }
        if parts[5].is_empty() {
            return Err(OutputError::Descriptor("measurement is empty".to_string()));
        }

        Ok(Self {
            endpoint: endpoint.to_string(),
            username: parts[1].to_string(),
            password: parts[2].to_string(),
            database: parts[3].to_string(),
            precision: parts[4].parse()?,
            measurement: parts[5].to_string(),
        })
    }
}

// Hand-written so the password never reaches the logs
impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"***")
            .field("database", &self.database)
            .field("precision", &self.precision)
            .field("measurement", &self.measurement)
            .finish()
    }
}
