//! tailflux Output
//!
//! Delivery of access records to InfluxDB.

pub mod influx;
pub mod line_protocol;
pub mod retry;
pub mod sink;

pub use influx::InfluxWriter;
pub use retry::{write_with_retry, RetryStrategy};
pub use sink::{SinkStats, TimeSeriesSink};
