use thiserror::Error;
use tracing::subscriber::{set_global_default, SetGlobalDefaultError};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{self, InitError},
};
use tracing_log::{log_tracer::SetLoggerError, LogTracer};
use tracing_subscriber::{fmt, EnvFilter, FmtSubscriber};

const LOG_DIR: &str = "logs";
const MAX_LOG_FILES: usize = 5;

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to build rolling file appender: {0}")]
    InitAppender(#[from] InitError),

    #[error("failed to init log tracer: {0}")]
    InitLogTracer(#[from] SetLoggerError),

    #[error("failed to set global default subscriber: {0}")]
    SetGlobalDefault(#[from] SetGlobalDefaultError),
}

/// Keeps the non-blocking file appender alive; dropping it flushes any
/// buffered log lines, so hold on to it until the process exits.
#[must_use]
pub enum LogFlusher {
    Flusher(WorkerGuard),
    NullFlusher,
}

/// Initializes tracing for a binary or example.
///
/// Logs from libraries using the `log` crate are bridged into `tracing`.
/// The filter comes from `RUST_LOG`, defaulting to `info`. With
/// `APP_ENVIRONMENT=prod` output goes to a daily-rolling JSON log file named
/// after `app_name`; otherwise it is pretty-printed to the terminal.
pub fn init_tracing(app_name: &str) -> Result<LogFlusher, TracingError> {
    LogTracer::init()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let is_prod = std::env::var("APP_ENVIRONMENT")
        .map(|env| env == "prod")
        .unwrap_or(false);

    if !is_prod {
        let format = fmt::format()
            .with_level(true)
            .with_ansi(true)
            .pretty()
            .with_line_number(false)
            .with_file(false)
            .with_target(false);

        let subscriber = FmtSubscriber::builder()
            .event_format(format)
            .with_env_filter(filter)
            .finish();

        set_global_default(subscriber)?;
        return Ok(LogFlusher::NullFlusher);
    }

    let file_appender = rolling::Builder::new()
        .filename_prefix(app_name)
        .filename_suffix("log")
        .rotation(rolling::Rotation::DAILY)
        .max_log_files(MAX_LOG_FILES)
        .build(LOG_DIR)?;

    let (file_appender, guard) = tracing_appender::non_blocking(file_appender);

    let format = fmt::format()
        .with_level(true)
        .with_ansi(false)
        .with_target(false);

    let subscriber = FmtSubscriber::builder()
        .event_format(format)
        .with_writer(file_appender)
        .json()
        .with_env_filter(filter)
        .finish();

    set_global_default(subscriber)?;
    Ok(LogFlusher::Flusher(guard))
}
