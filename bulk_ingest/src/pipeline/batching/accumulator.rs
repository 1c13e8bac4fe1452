use crate::record::{Batch, BatchId, Record};

use super::BatchConfig;

/// Collects records into the currently open batch and decides when the
/// batch is full.
///
/// The accumulator itself is synchronous state; the pipeline guards it (and
/// the producer side of the dispatch queue) behind a single mutex so that
/// closing a batch and enqueuing it is atomic with respect to concurrent
/// submissions.
pub(crate) struct BatchAccumulator {
    config: BatchConfig,
    next_id: BatchId,
    current: Batch,
}

impl BatchAccumulator {
    pub(crate) fn new(config: BatchConfig) -> BatchAccumulator {
        let current = Batch::new(0, config.max_records());
        BatchAccumulator {
            config,
            next_id: 1,
            current,
        }
    }

    /// Appends a record to the open batch. Returns the closed batch when the
    /// append tripped the record-count or byte threshold.
    pub(crate) fn push(&mut self, record: Record) -> Option<Batch> {
        self.current.push(record);

        let full = self.current.len() >= self.config.max_records()
            || self.current.encoded_len() >= self.config.max_bytes();

        if full {
            return Some(self.swap());
        }

        None
    }

    /// Closes the open batch regardless of thresholds. Returns `None` when
    /// the batch is empty; an empty batch is never enqueued.
    pub(crate) fn force_close(&mut self) -> Option<Batch> {
        if self.current.is_empty() {
            return None;
        }

        Some(self.swap())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    fn swap(&mut self) -> Batch {
        let fresh = Batch::new(self.next_id, self.config.max_records());
        self.next_id += 1;
        std::mem::replace(&mut self.current, fresh)
    }
}
