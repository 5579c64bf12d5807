use crate::error::{LookupError, OutputError};
use crate::log_entry::Point;
use async_trait::async_trait;

/// Resolves a client address to a human-readable place name
///
/// Implementations may block on a subprocess or a network call. Callers
/// bound the call with a timeout and treat any error as "no location".
#[async_trait]
pub trait LocationLookup: Send + Sync {
    /// Returns the name of the resolver (for logging/debugging)
    fn name(&self) -> &'static str;

    /// Resolve `ip` to a location string
    async fn lookup(&self, ip: &str) -> Result<String, LookupError>;
}

/// Delivers points to the time-series store
#[async_trait]
pub trait PointWriter: Send + Sync {
    /// Write a group of points in a single request
    async fn write_points(&self, points: &[Point]) -> Result<(), OutputError>;
}

/// A resolver that never knows anything
///
/// Used when geo enrichment is disabled.
pub struct NoLookup;

#[async_trait]
impl LocationLookup for NoLookup {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn lookup(&self, _ip: &str) -> Result<String, LookupError> {
        Ok(String::new())
    }
}
