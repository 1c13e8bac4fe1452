use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bulk_ingest::pipeline::batching::BatchConfig;
use bulk_ingest::pipeline::results::BatchOutcome;
use bulk_ingest::pipeline::writers::stdout::StdoutWriter;
use bulk_ingest::pipeline::{Pipeline, PipelineConfig};
use bulk_ingest::serde_json::json;
use clap::Parser;
use telemetry::init_tracing;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "stdout", version, about)]
struct AppArgs {
    /// Number of records to submit
    #[arg(long, default_value_t = 25)]
    records: usize,

    /// Maximum number of records per batch
    #[arg(long, default_value_t = 10)]
    max_records: usize,

    /// Maximum encoded batch size in bytes
    #[arg(long, default_value_t = 10_000_000)]
    max_bytes: usize,

    /// Flush interval in seconds
    #[arg(long, default_value_t = 10)]
    flush_interval_seconds: u64,

    /// Number of dispatch workers
    #[arg(long, default_value_t = 4)]
    workers: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let _log_flusher = init_tracing("stdout")?;

    if let Err(e) = main_impl().await {
        error!("{e}");
    }

    Ok(())
}

async fn main_impl() -> Result<(), Box<dyn Error>> {
    let args = AppArgs::parse();

    let config = PipelineConfig {
        batch: BatchConfig::new(
            args.max_records,
            args.max_bytes,
            Duration::from_secs(args.flush_interval_seconds),
        ),
        worker_count: args.workers,
        ..PipelineConfig::default()
    };

    let delivered = Arc::new(AtomicUsize::new(0));
    let delivered_in_callback = delivered.clone();

    let pipeline = Pipeline::new(config, StdoutWriter, move |outcome| match outcome {
        BatchOutcome::Completed(result) => {
            delivered_in_callback.fetch_add(result.total(), Ordering::SeqCst);
            info!(
                batch_id = result.batch_id(),
                succeeded = result.succeeded_count(),
                failed = result.failed_records().len(),
                "batch completed"
            );
        }
        BatchOutcome::Failed(failure) => {
            error!(batch_id = failure.batch.id(), "batch failed: {}", failure.error);
        }
    });

    pipeline.start().await?;

    for i in 0..args.records {
        pipeline
            .submit(json!({ "seq": i, "body": format!("record-{i}") }), None)
            .await?;
    }

    pipeline.flush().await?;

    let handle = pipeline.stop().await?;
    handle.wait().await?;

    info!(
        submitted = args.records,
        delivered = delivered.load(Ordering::SeqCst),
        "done"
    );

    Ok(())
}
