use std::time::Duration;
use tailflux_core::{OutputError, Point, PointWriter};
use tracing::warn;

/// How a failed write is retried before the sink gives up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
    /// Up to `n` attempts with no pause between them
    Immediate(u32),
    /// Up to `n` attempts; the k-th retry waits `k * delay`
    LinearBackoff(u32, Duration),
}

impl RetryStrategy {
    /// Pick a strategy from attempt count and backoff step
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        if backoff.is_zero() {
            RetryStrategy::Immediate(max_attempts.max(1))
        } else {
            RetryStrategy::LinearBackoff(max_attempts.max(1), backoff)
        }
    }

    pub fn max_attempts(&self) -> u32 {
        match self {
            RetryStrategy::Immediate(n) | RetryStrategy::LinearBackoff(n, _) => (*n).max(1),
        }
    }

    /// Pause after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self {
            RetryStrategy::Immediate(_) => Duration::ZERO,
            RetryStrategy::LinearBackoff(_, delay) => delay.saturating_mul(attempt),
        }
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        RetryStrategy::LinearBackoff(3, Duration::from_millis(500))
    }
}

/// Write `points`, retrying transient failures
///
/// Returns the number of attempts used. Client errors are not retried.
pub async fn write_with_retry(
    writer: &dyn PointWriter,
    points: &[Point],
    strategy: RetryStrategy,
) -> Result<u32, OutputError> {
    let max_attempts = strategy.max_attempts();
    let mut attempt = 1;

    loop {
        match writer.write_points(points).await {
            Ok(()) => return Ok(attempt),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = strategy.delay_after(attempt);
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Write failed, retrying"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
