//! Logging utilities for the clinic backend.
//!
//! Every binary calls [`init_from_config`] once at startup. The
//! filter comes from `RUST_LOG` when set, otherwise from `logging.level`.

use psiclinic_config::LoggingConfig;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging from the `[logging]` config section.
///
/// When `directory` is set a daily-rolling file layer is added; keep the returned
/// guard alive for the lifetime of the process so buffered lines get flushed.
pub fn init_from_config(config: &LoggingConfig) -> Option<WorkerGuard> {
    let directive = config.level.clone().unwrap_or_else(|| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directive));

    let stdout_layer = fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    let (file_layer, guard) = match config.directory.as_deref() {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "psiclinic.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let result = tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .with(filter)
        .try_init();

    if result.is_ok() {
        info!(filter = %directive, file_dir = ?config.directory, "Logging initialized");
    }
    guard
}

/// Log an error with context at the ERROR level.
pub fn log_error<E: std::fmt::Display>(error: E, context: &str) {
    error!("{}: {}", context, error);
}
