use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use std::path::Path;

use crate::error::{PriceError, Result};

/// Initializes the logging system (both console and file).
/// Returns a guard that must be kept alive for file logging to work.
pub fn init_logging(log_dir: &str, file_level: &str, console_level: &str) -> Result<WorkerGuard> {
    let log_path = Path::new(log_dir);
    if !log_path.exists() {
        std::fs::create_dir_all(log_path).map_err(PriceError::Io)?;
    }

    let file_appender = rolling::daily(log_dir, "retroprice.log");
    let (non_blocking_appender, guard) = tracing_appender::non_blocking(file_appender);

    let file_filter = EnvFilter::try_new(file_level).map_err(|e| {
        PriceError::Internal(format!("invalid file log level filter '{}': {}", file_level, e))
    })?;
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_appender)
        .with_ansi(false)
        .with_span_events(FmtSpan::CLOSE)
        .json()
        .with_filter(file_filter);

    let console_filter = EnvFilter::try_new(console_level).map_err(|e| {
        PriceError::Internal(format!(
            "invalid console log level filter '{}': {}",
            console_level, e
        ))
    })?;
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_span_events(FmtSpan::CLOSE)
        .with_filter(console_filter);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| {
            PriceError::Internal(format!("failed to initialize tracing subscriber: {}", e))
        })?;

    Ok(guard)
}
