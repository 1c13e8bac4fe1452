use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::record::Batch;

use super::results::{correlate, BatchFailure, BatchOutcome};
use super::writers::BulkWriter;

/// Spawns the fixed pool of dispatch workers.
///
/// The queue receiver is shared behind a mutex; each worker holds the lock
/// only while dequeuing, so a dequeued batch is exclusively owned by the
/// worker dispatching it.
pub(crate) fn spawn_workers<W: BulkWriter>(
    worker_count: usize,
    queue_rx: mpsc::Receiver<Batch>,
    writer: Arc<W>,
    outcome_tx: mpsc::Sender<BatchOutcome<W::Error>>,
) -> Vec<JoinHandle<()>> {
    let queue_rx = Arc::new(Mutex::new(queue_rx));

    (0..worker_count)
        .map(|worker_id| {
            tokio::spawn(run_worker(
                worker_id,
                queue_rx.clone(),
                writer.clone(),
                outcome_tx.clone(),
            ))
        })
        .collect()
}

async fn run_worker<W: BulkWriter>(
    worker_id: usize,
    queue_rx: Arc<Mutex<mpsc::Receiver<Batch>>>,
    writer: Arc<W>,
    outcome_tx: mpsc::Sender<BatchOutcome<W::Error>>,
) {
    loop {
        let batch = queue_rx.lock().await.recv().await;
        let Some(batch) = batch else {
            // Queue sender dropped and the queue is drained.
            break;
        };

        debug!(
            worker_id,
            batch_id = batch.id(),
            records = batch.len(),
            bytes = batch.encoded_len(),
            "dispatching batch"
        );

        let outcome = match writer.write_batch(&batch).await {
            Ok(report) => BatchOutcome::Completed(correlate(batch, report)),
            Err(error) => BatchOutcome::Failed(BatchFailure { batch, error }),
        };

        if outcome_tx.send(outcome).await.is_err() {
            warn!(worker_id, "outcome channel closed, stopping worker");
            break;
        }
    }

    debug!(worker_id, "worker finished");
}
