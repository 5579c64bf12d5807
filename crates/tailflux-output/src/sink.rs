use crate::retry::{write_with_retry, RetryStrategy};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tailflux_core::config::{InfluxConfig, TimestampSource};
use tailflux_core::{
    AccessRecord, HandoffReceiver, OutputError, Point, PointWriter, TailfluxError,
};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

/// Counters kept by the sink over its lifetime
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SinkStats {
    pub records: u64,
    pub points_written: u64,
    pub writes: u64,
}

/// Maps access records to points and delivers them to the store
///
/// Points are written once `batch_size` of them are buffered or the flush
/// interval elapses, whichever comes first. With the default batch size of
/// one every record triggers its own write. A write that still fails after
/// the retry strategy is exhausted stops the sink with an error.
pub struct TimeSeriesSink {
    writer: Arc<dyn PointWriter>,
    measurement: String,
    batch_size: usize,
    flush_interval: Duration,
    retry: RetryStrategy,
    timestamp_source: TimestampSource,
    buffer: Vec<Point>,
    stats: SinkStats,
}

impl TimeSeriesSink {
    pub fn new(writer: Arc<dyn PointWriter>, measurement: impl Into<String>) -> Self {
        Self {
            writer,
            measurement: measurement.into(),
            batch_size: 1,
            flush_interval: Duration::from_secs(1),
            retry: RetryStrategy::default(),
            timestamp_source: TimestampSource::Observed,
            buffer: Vec::new(),
            stats: SinkStats::default(),
        }
    }

    /// Create a sink from the output configuration
    pub fn from_config(
        writer: Arc<dyn PointWriter>,
        config: &InfluxConfig,
    ) -> Result<Self, TailfluxError> {
        let descriptor = config.descriptor()?;
        Ok(Self::new(writer, descriptor.measurement)
            .with_batch_size(config.batch_size)
            .with_flush_interval(config.flush_interval())
            .with_retry(RetryStrategy::new(config.max_attempts, config.backoff()))
            .with_timestamp_source(config.timestamp))
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_retry(mut self, retry: RetryStrategy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timestamp_source(mut self, source: TimestampSource) -> Self {
        self.timestamp_source = source;
        self
    }

    pub fn stats(&self) -> SinkStats {
        self.stats
    }

    /// Number of points waiting for the next flush
    pub fn buffered_count(&self) -> usize {
        self.buffer.len()
    }

    /// Map a record to a point stamped at `observed_at`
    pub fn to_point(&self, record: &AccessRecord, observed_at: DateTime<Utc>) -> Point {
        let timestamp = match self.timestamp_source {
            TimestampSource::Observed => observed_at,
            TimestampSource::Event => record
                .event_time
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or(observed_at),
        };

        Point::new(self.measurement.clone(), timestamp)
            .with_tag("Path", record.path.clone())
            .with_tag("Method", record.method.clone())
            .with_tag("Scheme", record.scheme.clone())
            .with_tag("Status", record.status.clone())
            .with_field("SourceIp", record.source_ip.clone())
            .with_field("SourceLocation", record.source_location.clone())
            .with_field("SourceHostInfo", record.source_host_info.clone())
    }

    /// Accept one record, writing the buffer if it is full
    pub async fn deliver(&mut self, record: AccessRecord) -> Result<(), OutputError> {
        let point = self.to_point(&record, Utc::now());
        self.buffer.push(point);
        self.stats.records += 1;

        if self.buffer.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Write everything buffered
    pub async fn flush(&mut self) -> Result<(), OutputError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let attempts = write_with_retry(self.writer.as_ref(), &self.buffer, self.retry).await?;
        let written = self.buffer.len();
        self.buffer.clear();
        self.stats.points_written += written as u64;
        self.stats.writes += 1;

        info!(points = written, attempts, "write success");
        Ok(())
    }

    /// Consume records until the input closes, then flush what is left
    pub async fn run(
        mut self,
        mut receiver: HandoffReceiver<AccessRecord>,
    ) -> Result<SinkStats, TailfluxError> {
        info!(
            measurement = %self.measurement,
            batch_size = self.batch_size,
            flush_interval_ms = self.flush_interval.as_millis() as u64,
            "Time-series sink started"
        );

        let mut ticker = interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe_record = receiver.recv() => {
                    let Some(record) = maybe_record else {
                        break;
                    };
                    debug!(ip = %record.source_ip, path = %record.path, "Delivering record");
                    if let Err(e) = self.deliver(record).await {
                        error!(error = %e, "Giving up on time-series write");
                        return Err(e.into());
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.flush().await {
                        error!(error = %e, "Giving up on time-series write");
                        return Err(e.into());
                    }
                }
            }
        }

        if let Err(e) = self.flush().await {
            error!(error = %e, "Failed to flush remaining points");
            return Err(e.into());
        }

        info!(
            records = self.stats.records,
            points_written = self.stats.points_written,
            writes = self.stats.writes,
            "Time-series sink stopped"
        );
        Ok(self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{FixedOffset, TimeZone};
    use std::sync::Mutex;
    use tailflux_core::handoff;

    /// Records every write request
    #[derive(Default)]
    struct RecordingWriter {
        writes: Mutex<Vec<Vec<Point>>>,
    }

    impl RecordingWriter {
        fn writes(&self) -> Vec<Vec<Point>> {
            self.writes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PointWriter for RecordingWriter {
        async fn write_points(&self, points: &[Point]) -> Result<(), OutputError> {
            self.writes.lock().unwrap().push(points.to_vec());
            Ok(())
        }
    }

    struct RefusingWriter;

    #[async_trait]
    impl PointWriter for RefusingWriter {
        async fn write_points(&self, _points: &[Point]) -> Result<(), OutputError> {
            Err(OutputError::Network("connection refused".to_string()))
        }
    }

    fn record(path: &str) -> AccessRecord {
        AccessRecord {
            source_ip: "103.72.172.71".to_string(),
            source_location: "Hong Kong".to_string(),
            source_host_info: "Mozilla/5.0".to_string(),
            path: path.to_string(),
            method: "GET".to_string(),
            scheme: "HTTP/1.1".to_string(),
            status: "304".to_string(),
            event_time: Some(
                FixedOffset::east_opt(8 * 3600)
                    .unwrap()
                    .with_ymd_and_hms(2022, 9, 22, 15, 51, 16)
                    .unwrap(),
            ),
        }
    }

    fn tag<'a>(point: &'a Point, key: &str) -> &'a str {
        point.tags.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str()).unwrap()
    }

    fn field<'a>(point: &'a Point, key: &str) -> &'a str {
        point.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str()).unwrap()
    }

    #[test]
    fn test_to_point_tags_and_fields() {
        let sink = TimeSeriesSink::new(Arc::new(RecordingWriter::default()), "nginx_access");
        let now = Utc::now();
        let point = sink.to_point(&record("/images/06.jpg"), now);

        assert_eq!(point.measurement, "nginx_access");
        assert_eq!(point.timestamp, now);
        assert_eq!(tag(&point, "Path"), "/images/06.jpg");
        assert_eq!(tag(&point, "Method"), "GET");
        assert_eq!(tag(&point, "Scheme"), "HTTP/1.1");
        assert_eq!(tag(&point, "Status"), "304");
        assert_eq!(field(&point, "SourceIp"), "103.72.172.71");
        assert_eq!(field(&point, "SourceLocation"), "Hong Kong");
        assert_eq!(field(&point, "SourceHostInfo"), "Mozilla/5.0");
    }

    #[test]
    fn test_event_timestamp_source() {
        let sink = TimeSeriesSink::new(Arc::new(RecordingWriter::default()), "m")
            .with_timestamp_source(TimestampSource::Event);
        let now = Utc::now();

        let point = sink.to_point(&record("/"), now);
        assert_eq!(point.timestamp, Utc.with_ymd_and_hms(2022, 9, 22, 7, 51, 16).unwrap());

        let mut undated = record("/");
        undated.event_time = None;
        assert_eq!(sink.to_point(&undated, now).timestamp, now);
    }

    #[tokio::test]
    async fn test_each_record_written_immediately() {
        let writer = Arc::new(RecordingWriter::default());
        let mut sink = TimeSeriesSink::new(writer.clone(), "m");

        sink.deliver(record("/a")).await.unwrap();
        sink.deliver(record("/b")).await.unwrap();

        let writes = writer.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].len(), 1);
        assert_eq!(tag(&writes[1][0], "Path"), "/b");
        assert_eq!(sink.stats().writes, 2);
    }

    #[tokio::test]
    async fn test_batching_waits_for_full_batch() {
        let writer = Arc::new(RecordingWriter::default());
        let mut sink = TimeSeriesSink::new(writer.clone(), "m").with_batch_size(3);

        sink.deliver(record("/a")).await.unwrap();
        sink.deliver(record("/b")).await.unwrap();
        assert!(writer.writes().is_empty());
        assert_eq!(sink.buffered_count(), 2);

        sink.deliver(record("/c")).await.unwrap();
        let writes = writer.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].len(), 3);
        assert_eq!(sink.buffered_count(), 0);
    }

    #[tokio::test]
    async fn test_run_flushes_partial_batch_on_interval() {
        let writer = Arc::new(RecordingWriter::default());
        let sink = TimeSeriesSink::new(writer.clone(), "m")
            .with_batch_size(100)
            .with_flush_interval(Duration::from_millis(20));

        let (sender, receiver) = handoff();
        let handle = tokio::spawn(sink.run(receiver));

        sender.send(record("/a")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(writer.writes().len(), 1);

        drop(sender);
        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.points_written, 1);
    }

    #[tokio::test]
    async fn test_run_flushes_on_close_in_order() {
        let writer = Arc::new(RecordingWriter::default());
        let sink = TimeSeriesSink::new(writer.clone(), "m")
            .with_batch_size(10)
            .with_flush_interval(Duration::from_secs(3600));

        let (sender, receiver) = handoff();
        let handle = tokio::spawn(sink.run(receiver));
        for path in ["/1", "/2", "/3"] {
            sender.send(record(path)).await.unwrap();
        }
        drop(sender);

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.records, 3);
        let writes = writer.writes();
        let paths: Vec<&str> = writes[0].iter().map(|p| tag(p, "Path")).collect();
        assert_eq!(paths, vec!["/1", "/2", "/3"]);
    }

    #[tokio::test]
    async fn test_run_stops_on_write_failure() {
        let sink = TimeSeriesSink::new(Arc::new(RefusingWriter), "m")
            .with_retry(RetryStrategy::Immediate(2));

        let (sender, receiver) = handoff();
        let handle = tokio::spawn(sink.run(receiver));
        sender.send(record("/a")).await.unwrap();

        let result = handle.await.unwrap();
        assert!(matches!(
            result,
            Err(TailfluxError::Output(OutputError::Network(_)))
        ));
        // The receiver is gone, nothing more is accepted
        assert!(sender.send(record("/b")).await.is_err());
    }

    #[test]
    fn test_from_config() {
        let config = InfluxConfig {
            dsn: "http://influx:8086@u@p@db@ms@access".to_string(),
            batch_size: 25,
            backoff_ms: 0,
            max_attempts: 4,
            ..Default::default()
        };
        let sink = TimeSeriesSink::from_config(Arc::new(RecordingWriter::default()), &config).unwrap();
        assert_eq!(sink.measurement, "access");
        assert_eq!(sink.batch_size, 25);
        assert_eq!(sink.retry, RetryStrategy::Immediate(4));
    }
}
