use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::record::{Batch, Record};

use self::batching::accumulator::BatchAccumulator;
use self::batching::BatchConfig;
use self::results::BatchOutcome;
use self::workers::spawn_workers;
use self::writers::BulkWriter;

pub mod batching;
pub mod results;
mod workers;
pub mod writers;

const DEFAULT_WORKER_COUNT: usize = 4;
const DEFAULT_QUEUE_DEPTH: usize = 16;

/// Lifecycle of the pipeline. New records are accepted only while `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Constructed but not started.
    Created,
    /// Accepting new records.
    Open,
    /// No new records accepted; outstanding batches still flushing.
    Draining,
    /// Terminal; all batches resolved.
    Closed,
}

/// Errors reported synchronously to a `submit` caller. These are local
/// conditions; the pipeline itself is unaffected.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("pipeline is not accepting records")]
    PipelineClosed,

    #[error("record payload is empty")]
    EmptySubmission,

    #[error("failed to encode record payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("dispatch queue closed unexpectedly")]
    QueueClosed,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid pipeline configuration: {0}")]
    Config(&'static str),

    #[error("operation not allowed while pipeline is {0:?}")]
    InvalidState(PipelineState),

    #[error("dispatch queue closed unexpectedly")]
    QueueClosed,

    #[error("pipeline task panicked: {0}")]
    TaskPanic(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub batch: BatchConfig,
    /// Number of concurrent dispatch workers.
    pub worker_count: usize,
    /// Capacity of the bounded dispatch queue. A full queue blocks the
    /// enqueuing path; this is the pipeline's backpressure mechanism.
    pub queue_depth: usize,
}

impl Default for PipelineConfig {
    fn default() -> PipelineConfig {
        PipelineConfig {
            batch: BatchConfig::default(),
            worker_count: DEFAULT_WORKER_COUNT,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

impl PipelineConfig {
    fn validate(&self) -> Result<(), PipelineError> {
        if self.worker_count == 0 {
            return Err(PipelineError::Config("worker_count must be at least 1"));
        }
        if self.queue_depth == 0 {
            return Err(PipelineError::Config("queue_depth must be at least 1"));
        }
        if self.batch.max_records() == 0 {
            return Err(PipelineError::Config("max_records must be at least 1"));
        }
        if self.batch.max_bytes() == 0 {
            return Err(PipelineError::Config("max_bytes must be at least 1"));
        }
        if self.batch.flush_interval().is_zero() {
            return Err(PipelineError::Config("flush_interval must be non-zero"));
        }
        Ok(())
    }
}

/// State behind the single lock that serializes all producers: the open
/// batch, the lifecycle state, and the producer side of the dispatch queue.
/// Keeping the queue sender here makes close-and-enqueue atomic with respect
/// to concurrent submissions.
struct Inner {
    state: PipelineState,
    accumulator: BatchAccumulator,
    queue_tx: Option<mpsc::Sender<Batch>>,
}

struct Shared {
    inner: Mutex<Inner>,
    /// Carries the instant of the most recent batch close. The flush timer
    /// restarts its interval from this instant, so the interval bounds the
    /// age of the oldest buffered record; a watch channel keeps the signal
    /// lossless even if the timer is busy when a close happens.
    batch_closed: watch::Sender<Instant>,
}

struct QueueClosed;

impl Shared {
    /// Hands a closed batch to the dispatch queue. Called with the inner
    /// lock held; a full queue blocks here, slowing producers down instead
    /// of growing the pipeline unboundedly.
    async fn enqueue(
        &self,
        inner: &mut Inner,
        batch: Batch,
        trigger: &'static str,
    ) -> Result<(), QueueClosed> {
        let Some(queue_tx) = inner.queue_tx.as_ref() else {
            return Err(QueueClosed);
        };

        debug!(
            batch_id = batch.id(),
            records = batch.len(),
            bytes = batch.encoded_len(),
            trigger,
            "batch closed"
        );

        if queue_tx.send(batch).await.is_err() {
            return Err(QueueClosed);
        }

        self.batch_closed.send_replace(Instant::now());

        Ok(())
    }
}

struct Tasks {
    timer: JoinHandle<()>,
    timer_shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
    delivery: JoinHandle<()>,
}

/// Handle returned by [`Pipeline::stop`], decoupling "stop accepting work"
/// from "all work finished".
pub struct StopHandle {
    shared: Arc<Shared>,
    tasks: Tasks,
    /// Set when the final drain batch could not be enqueued during `stop`.
    /// Reported from `wait` unless a task panic explains the failure better.
    drain_error: Option<PipelineError>,
}

impl std::fmt::Debug for StopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopHandle")
            .field("drain_error", &self.drain_error)
            .finish_non_exhaustive()
    }
}

impl StopHandle {
    /// Blocks until the dispatch queue is drained and every in-flight batch
    /// has been resolved, then transitions the pipeline to `Closed`. Returns
    /// the first fatal error encountered during the drain, if any.
    pub async fn wait(self) -> Result<(), PipelineError> {
        let StopHandle {
            shared,
            tasks,
            drain_error,
        } = self;

        let mut first_error: Option<PipelineError> = None;

        if let Err(e) = tasks.timer.await {
            first_error.get_or_insert(e.into());
        }
        for result in join_all(tasks.workers).await {
            if let Err(e) = result {
                first_error.get_or_insert(e.into());
            }
        }
        if let Err(e) = tasks.delivery.await {
            first_error.get_or_insert(e.into());
        }

        if first_error.is_none() {
            first_error = drain_error;
        }

        let mut inner = shared.inner.lock().await;
        inner.state = PipelineState::Closed;
        info!("pipeline closed");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Asynchronous batched ingestion pipeline.
///
/// Callers submit individual records from any number of concurrent tasks;
/// the pipeline groups them into bounded batches and dispatches the batches
/// to the [`BulkWriter`] through a fixed worker pool. Every batch outcome,
/// full success, partial failure, or whole-call failure, is delivered
/// exactly once through the callback registered at construction.
pub struct Pipeline<W: BulkWriter> {
    config: PipelineConfig,
    writer: Arc<W>,
    callback: Arc<dyn Fn(BatchOutcome<W::Error>) + Send + Sync>,
    shared: Arc<Shared>,
    tasks: Mutex<Option<Tasks>>,
}

impl<W: BulkWriter> Pipeline<W> {
    /// Creates a pipeline in the `Created` state. The outcome callback is
    /// registered once here; it is invoked from a dedicated delivery task,
    /// never from a worker or a submitting caller.
    pub fn new(
        config: PipelineConfig,
        writer: W,
        on_outcome: impl Fn(BatchOutcome<W::Error>) + Send + Sync + 'static,
    ) -> Pipeline<W> {
        let accumulator = BatchAccumulator::new(config.batch.clone());
        let (batch_closed, _) = watch::channel(Instant::now());

        Pipeline {
            config,
            writer: Arc::new(writer),
            callback: Arc::new(on_outcome),
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: PipelineState::Created,
                    accumulator,
                    queue_tx: None,
                }),
                batch_closed,
            }),
            tasks: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> PipelineState {
        self.shared.inner.lock().await.state
    }

    /// Spins up the worker pool, the outcome delivery task, and the flush
    /// timer, and transitions into `Open`. Idempotent when already `Open`;
    /// fails once the pipeline is draining or closed. Configuration problems
    /// are surfaced synchronously here.
    pub async fn start(&self) -> Result<(), PipelineError> {
        let mut inner = self.shared.inner.lock().await;

        match inner.state {
            PipelineState::Open => return Ok(()),
            PipelineState::Created => {}
            state => return Err(PipelineError::InvalidState(state)),
        }

        self.config.validate()?;

        let (queue_tx, queue_rx) = mpsc::channel(self.config.queue_depth);
        let (outcome_tx, outcome_rx) = mpsc::channel(self.config.queue_depth);

        let workers = spawn_workers(
            self.config.worker_count,
            queue_rx,
            self.writer.clone(),
            outcome_tx,
        );

        let callback = self.callback.clone();
        let delivery = tokio::spawn(deliver_outcomes(outcome_rx, callback));

        let (timer_shutdown, shutdown_rx) = watch::channel(false);
        let timer = tokio::spawn(run_flush_timer(
            self.shared.clone(),
            self.config.batch.flush_interval(),
            self.shared.batch_closed.subscribe(),
            shutdown_rx,
        ));

        inner.queue_tx = Some(queue_tx);
        inner.state = PipelineState::Open;

        *self.tasks.lock().await = Some(Tasks {
            timer,
            timer_shutdown,
            workers,
            delivery,
        });

        info!(
            workers = self.config.worker_count,
            max_records = self.config.batch.max_records(),
            max_bytes = self.config.batch.max_bytes(),
            "pipeline started"
        );

        Ok(())
    }

    /// Appends a record to the currently open batch. Non-blocking except
    /// when this call trips a threshold, in which case it pays the cost of
    /// the enqueue (which may block under dispatch-queue backpressure).
    pub async fn submit(
        &self,
        payload: Value,
        idempotency_key: Option<String>,
    ) -> Result<(), SubmitError> {
        if payload.is_null() {
            return Err(SubmitError::EmptySubmission);
        }

        let record = Record::new(payload, idempotency_key)?;

        let mut inner = self.shared.inner.lock().await;

        if inner.state != PipelineState::Open {
            return Err(SubmitError::PipelineClosed);
        }

        if let Some(batch) = inner.accumulator.push(record) {
            self.shared
                .enqueue(&mut inner, batch, "threshold")
                .await
                .map_err(|QueueClosed| SubmitError::QueueClosed)?;
        }

        Ok(())
    }

    /// Forces the current, possibly partially filled, batch to close and
    /// enqueue immediately, without a state transition. Returns once the
    /// batch has been handed to the dispatch queue, not once it has been
    /// dispatched.
    pub async fn flush(&self) -> Result<(), PipelineError> {
        let mut inner = self.shared.inner.lock().await;

        if inner.state != PipelineState::Open {
            return Err(PipelineError::InvalidState(inner.state));
        }

        if let Some(batch) = inner.accumulator.force_close() {
            self.shared
                .enqueue(&mut inner, batch, "flush")
                .await
                .map_err(|QueueClosed| PipelineError::QueueClosed)?;
        }

        Ok(())
    }

    /// Transitions to `Draining`: rejects new submissions, flushes any
    /// non-empty open batch, cancels the flush timer, and closes the
    /// dispatch queue so workers exit once it is drained. In-flight bulk
    /// writes are allowed to finish.
    pub async fn stop(&self) -> Result<StopHandle, PipelineError> {
        let mut inner = self.shared.inner.lock().await;

        if inner.state != PipelineState::Open {
            return Err(PipelineError::InvalidState(inner.state));
        }

        inner.state = PipelineState::Draining;
        info!("pipeline draining");

        // A closed queue here means the workers are already gone; tear down
        // anyway so wait() can join them and surface what happened.
        let mut drain_error = None;
        if let Some(batch) = inner.accumulator.force_close() {
            if let Err(QueueClosed) = self.shared.enqueue(&mut inner, batch, "drain").await {
                warn!("dispatch queue closed before drain, discarding final batch");
                drain_error = Some(PipelineError::QueueClosed);
            }
        }

        // Dropping the only sender closes the queue once workers drain it.
        inner.queue_tx = None;
        drop(inner);

        let tasks = self
            .tasks
            .lock()
            .await
            .take()
            .ok_or(PipelineError::InvalidState(PipelineState::Draining))?;

        // Timer flushes run under the inner lock, so by the time stop()
        // held it no timer enqueue can still be in progress.
        let _ = tasks.timer_shutdown.send(true);

        Ok(StopHandle {
            shared: self.shared.clone(),
            tasks,
            drain_error,
        })
    }
}

/// The single time-based trigger. Each tick force-closes a non-empty open
/// batch; the deadline restarts whenever a batch closes for any reason, so
/// the interval bounds record staleness rather than ticking from pipeline
/// start.
async fn run_flush_timer(
    shared: Arc<Shared>,
    interval: Duration,
    mut batch_closed: watch::Receiver<Instant>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut deadline = Instant::now() + interval;

    loop {
        tokio::select! {
            _ = sleep_until(deadline) => {
                let mut inner = shared.inner.lock().await;
                if inner.state == PipelineState::Open {
                    if let Some(batch) = inner.accumulator.force_close() {
                        if shared.enqueue(&mut inner, batch, "timer").await.is_err() {
                            warn!("dispatch queue closed, stopping flush timer");
                            break;
                        }
                    }
                }
                deadline = Instant::now() + interval;
            }
            result = batch_closed.changed() => {
                if result.is_err() {
                    break;
                }
                deadline = *batch_closed.borrow_and_update() + interval;
            }
            _ = shutdown.changed() => break,
        }
    }

    debug!("flush timer stopped");
}

/// Consumes resolved outcomes and invokes the registered callback, exactly
/// once per batch. Runs until every worker has dropped its sender.
async fn deliver_outcomes<E>(
    mut outcome_rx: mpsc::Receiver<BatchOutcome<E>>,
    callback: Arc<dyn Fn(BatchOutcome<E>) + Send + Sync>,
) {
    while let Some(outcome) = outcome_rx.recv().await {
        callback(outcome);
    }

    debug!("outcome delivery finished");
}
