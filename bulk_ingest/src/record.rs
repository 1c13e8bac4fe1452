use chrono::{DateTime, Utc};
use serde_json::Value;

/// Monotonic sequence number assigned to a batch when it is opened.
pub type BatchId = u64;

/// A single caller-submitted unit of data.
///
/// The payload is treated as an opaque structured value. The encoded length
/// is computed once at submission time with the same serializer the bulk
/// writer is expected to use, so batch byte accounting stays O(1).
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    payload: Value,
    idempotency_key: Option<String>,
    encoded_len: usize,
}

impl Record {
    pub(crate) fn new(
        payload: Value,
        idempotency_key: Option<String>,
    ) -> Result<Record, serde_json::Error> {
        let encoded_len = serde_json::to_vec(&payload)?.len();
        Ok(Record {
            payload,
            idempotency_key,
            encoded_len,
        })
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn idempotency_key(&self) -> Option<&str> {
        self.idempotency_key.as_deref()
    }

    /// Length of the payload when encoded as JSON. This is an estimate of
    /// the wire size, not a strict bound: a writer that encodes the payload
    /// differently will see slightly different numbers.
    pub fn encoded_len(&self) -> usize {
        self.encoded_len
    }
}

/// An immutable, ordered group of records sent together to the bulk writer.
///
/// Once a batch has been closed and handed to the dispatch queue it is never
/// split, merged, or reordered. A record's position within the batch is the
/// correlation key for per-record failures.
#[derive(Debug)]
pub struct Batch {
    id: BatchId,
    opened_at: DateTime<Utc>,
    records: Vec<Record>,
    encoded_len: usize,
}

impl Batch {
    pub(crate) fn new(id: BatchId, capacity: usize) -> Batch {
        Batch {
            id,
            opened_at: Utc::now(),
            records: Vec::with_capacity(capacity),
            encoded_len: 0,
        }
    }

    pub(crate) fn push(&mut self, record: Record) {
        self.encoded_len += record.encoded_len();
        self.records.push(record);
    }

    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Running total of the encoded lengths of all records in the batch.
    pub fn encoded_len(&self) -> usize {
        self.encoded_len
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub(crate) fn into_records(self) -> Vec<Record> {
        self.records
    }
}
