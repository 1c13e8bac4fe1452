use async_trait::async_trait;
use tracing::info;

use crate::record::Batch;

use super::{BulkWriter, InfallibleWriterError, WriteReport};

pub struct StdoutWriter;

#[async_trait]
impl BulkWriter for StdoutWriter {
    type Error = InfallibleWriterError;

    async fn write_batch(&self, batch: &Batch) -> Result<WriteReport, Self::Error> {
        for record in batch.records() {
            info!("{}", record.payload());
        }
        Ok(WriteReport::success())
    }
}
