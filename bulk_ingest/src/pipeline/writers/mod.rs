use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::Batch;

#[cfg(feature = "stdout")]
pub mod stdout;

/// Error type for writers which cannot fail.
#[derive(Debug, Error)]
pub enum InfallibleWriterError {}

/// Error reported by the remote endpoint for one record in a batch.
/// Writers typically deserialize this from the endpoint's bulk response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    pub code: Option<String>,
    pub message: String,
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{}: {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// A rejection of a single record inside an otherwise successful bulk write.
/// The index is 0-based into the batch that was written.
#[derive(Debug, Clone)]
pub struct WriteFailure {
    pub index: usize,
    pub error: RecordError,
}

/// The raw outcome of one bulk write call. An empty failure list means every
/// record in the batch was accepted.
#[derive(Debug, Clone, Default)]
pub struct WriteReport {
    failures: Vec<WriteFailure>,
}

impl WriteReport {
    /// Report with every record accepted.
    pub fn success() -> WriteReport {
        WriteReport::default()
    }

    pub fn with_failures(failures: Vec<WriteFailure>) -> WriteReport {
        WriteReport { failures }
    }

    pub fn failures(&self) -> &[WriteFailure] {
        &self.failures
    }

    pub(crate) fn into_failures(self) -> Vec<WriteFailure> {
        self.failures
    }
}

/// The bulk-write collaborator the pipeline dispatches batches to.
///
/// A `Self::Error` return means the whole call failed and no per-record
/// outcome is available; per-record rejections are reported inside an `Ok`
/// [`WriteReport`]. Implementations are shared across workers, so they take
/// `&self` and must be internally synchronized if they keep state.
#[async_trait]
pub trait BulkWriter: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn write_batch(&self, batch: &Batch) -> Result<WriteReport, Self::Error>;
}
