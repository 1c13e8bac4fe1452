use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bulk_ingest::pipeline::writers::{BulkWriter, RecordError, WriteFailure, WriteReport};
use bulk_ingest::record::{Batch, BatchId};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("transport failed: {0}")]
pub struct TestTransportError(pub String);

/// What the writer saw for one dispatched batch.
#[derive(Debug, Clone)]
pub struct CapturedBatch {
    pub batch_id: BatchId,
    pub payloads: Vec<Value>,
    pub keys: Vec<Option<String>>,
}

/// Bulk writer capturing every batch it is asked to write, with per-call
/// failure injection.
///
/// Uses Arc<Mutex> so tests keep a handle to the captured state while the
/// pipeline's workers share the writer.
#[derive(Clone)]
pub struct TestWriter {
    inner: Arc<Mutex<TestWriterInner>>,
}

struct TestWriterInner {
    batches: Vec<CapturedBatch>,
    // Failure indices to report for upcoming calls, one entry per call.
    injected_failures: VecDeque<Vec<usize>>,
    fail_whole_calls: usize,
    panic_calls: usize,
    delay: Option<Duration>,
}

impl TestWriter {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(TestWriterInner {
                batches: Vec::new(),
                injected_failures: VecDeque::new(),
                fail_whole_calls: 0,
                panic_calls: 0,
                delay: None,
            })),
        }
    }

    /// The next call will report these 0-based record indices as rejected.
    pub fn inject_failures(&self, indices: Vec<usize>) {
        self.inner.lock().unwrap().injected_failures.push_back(indices);
    }

    /// The next call will fail transport-level, before any record is written.
    pub fn fail_next_call(&self) {
        self.inner.lock().unwrap().fail_whole_calls += 1;
    }

    /// The next call will panic after capturing the batch, taking the worker
    /// task down with it.
    pub fn panic_next_call(&self) {
        self.inner.lock().unwrap().panic_calls += 1;
    }

    /// Every call will sleep this long before completing.
    pub fn set_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().delay = Some(delay);
    }

    pub fn batches(&self) -> Vec<CapturedBatch> {
        self.inner.lock().unwrap().batches.clone()
    }

    pub fn batch_count(&self) -> usize {
        self.inner.lock().unwrap().batches.len()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.inner
            .lock()
            .unwrap()
            .batches
            .iter()
            .map(|b| b.payloads.len())
            .collect()
    }

    pub fn all_payloads(&self) -> Vec<Value> {
        self.inner
            .lock()
            .unwrap()
            .batches
            .iter()
            .flat_map(|b| b.payloads.clone())
            .collect()
    }
}

#[async_trait]
impl BulkWriter for TestWriter {
    type Error = TestTransportError;

    async fn write_batch(&self, batch: &Batch) -> Result<WriteReport, Self::Error> {
        let delay = self.inner.lock().unwrap().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.lock().unwrap();

        if inner.fail_whole_calls > 0 {
            inner.fail_whole_calls -= 1;
            return Err(TestTransportError("connection reset".to_string()));
        }

        inner.batches.push(CapturedBatch {
            batch_id: batch.id(),
            payloads: batch.records().iter().map(|r| r.payload().clone()).collect(),
            keys: batch
                .records()
                .iter()
                .map(|r| r.idempotency_key().map(str::to_string))
                .collect(),
        });

        if inner.panic_calls > 0 {
            inner.panic_calls -= 1;
            // Release the lock first so later calls don't hit a poisoned mutex.
            drop(inner);
            panic!("writer crashed mid-batch");
        }

        let failures = inner
            .injected_failures
            .pop_front()
            .unwrap_or_default()
            .into_iter()
            .map(|index| WriteFailure {
                index,
                error: RecordError {
                    code: Some("rejected".to_string()),
                    message: format!("record at index {index} rejected"),
                },
            })
            .collect();

        Ok(WriteReport::with_failures(failures))
    }
}
