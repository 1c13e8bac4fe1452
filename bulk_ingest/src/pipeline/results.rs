use tracing::warn;

use crate::record::{Batch, BatchId, Record};

use super::writers::{RecordError, WriteReport};

/// The resolved outcome of one dispatched batch, delivered exactly once per
/// batch through the pipeline's completion callback. There is no ordering
/// guarantee across batches.
#[derive(Debug)]
pub enum BatchOutcome<E> {
    /// The bulk write call completed. Individual records may still have been
    /// rejected; see [`BatchResult::failed_records`].
    Completed(BatchResult),
    /// The bulk write call itself failed and no record in the batch was
    /// written. The batch is not retried, not requeued, and not split.
    Failed(BatchFailure<E>),
}

impl<E> BatchOutcome<E> {
    pub fn batch_id(&self) -> BatchId {
        match self {
            BatchOutcome::Completed(result) => result.batch_id(),
            BatchOutcome::Failed(failure) => failure.batch.id(),
        }
    }
}

/// A record that was rejected by the remote endpoint, resolved back to its
/// position in the batch.
#[derive(Debug)]
pub struct FailedRecord {
    pub index: usize,
    pub record: Record,
    pub error: RecordError,
}

/// Per-record accounting for a batch whose bulk write call completed.
///
/// Invariant: `succeeded_count + failed_records.len() == total`.
#[derive(Debug)]
pub struct BatchResult {
    batch_id: BatchId,
    total: usize,
    succeeded_count: usize,
    failed_records: Vec<FailedRecord>,
}

impl BatchResult {
    pub fn batch_id(&self) -> BatchId {
        self.batch_id
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn succeeded_count(&self) -> usize {
        self.succeeded_count
    }

    pub fn failed_records(&self) -> &[FailedRecord] {
        &self.failed_records
    }

    /// Whether every record in the batch was accepted.
    pub fn is_success(&self) -> bool {
        self.failed_records.is_empty()
    }

    /// Looks up whether the record with the given idempotency key was among
    /// the failures. `None` means the record was not rejected.
    pub fn failure_for(&self, idempotency_key: &str) -> Option<&FailedRecord> {
        self.failed_records
            .iter()
            .find(|failed| failed.record.idempotency_key() == Some(idempotency_key))
    }
}

/// A whole-call failure: the transport-level error plus the batch that was
/// being dispatched, handed back to the caller untouched.
#[derive(Debug)]
pub struct BatchFailure<E> {
    pub batch: Batch,
    pub error: E,
}

/// Maps the writer's 0-based failure indices back to the original records.
///
/// Batch order is immutable, so resolution is positional. Out-of-range or
/// duplicate indices coming back from the writer are ignored with a warning
/// so the count invariant holds.
pub(crate) fn correlate(batch: Batch, report: WriteReport) -> BatchResult {
    let batch_id = batch.id();
    let total = batch.len();

    let mut records: Vec<Option<Record>> = batch.into_records().into_iter().map(Some).collect();
    let mut failed_records = Vec::new();

    for failure in report.into_failures() {
        let record = records.get_mut(failure.index).and_then(Option::take);
        match record {
            Some(record) => failed_records.push(FailedRecord {
                index: failure.index,
                record,
                error: failure.error,
            }),
            None => {
                warn!(
                    batch_id,
                    index = failure.index,
                    "writer reported a failure for an unknown record index"
                );
            }
        }
    }

    let succeeded_count = total - failed_records.len();

    BatchResult {
        batch_id,
        total,
        succeeded_count,
        failed_records,
    }
}
