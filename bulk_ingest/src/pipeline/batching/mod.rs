use std::time::Duration;

pub mod accumulator;

const DEFAULT_MAX_RECORDS: usize = 500;
const DEFAULT_MAX_BYTES: usize = 10_000_000;
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Thresholds that close the currently open batch. All three are independent
/// triggers; whichever trips first closes the batch.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    max_records: usize,
    max_bytes: usize,
    flush_interval: Duration,
}

impl BatchConfig {
    pub fn new(max_records: usize, max_bytes: usize, flush_interval: Duration) -> BatchConfig {
        BatchConfig {
            max_records,
            max_bytes,
            flush_interval,
        }
    }

    /// A batch never holds more than this many records.
    pub fn max_records(&self) -> usize {
        self.max_records
    }

    /// Encoded-size threshold. A batch may exceed this only by the encoded
    /// length of the single record whose addition tripped the threshold;
    /// that record is still included, not deferred. The accounting is an
    /// estimate based on JSON encoding, not a strict wire-size bound.
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Maximum age of the oldest buffered record before a non-empty batch is
    /// force-closed by the timer.
    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }
}

impl Default for BatchConfig {
    fn default() -> BatchConfig {
        BatchConfig {
            max_records: DEFAULT_MAX_RECORDS,
            max_bytes: DEFAULT_MAX_BYTES,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}
