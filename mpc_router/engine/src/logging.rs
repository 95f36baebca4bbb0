use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize tracing with both stdout and rolling file output.
/// Format: human-readable logfmt OR JSON if desired.
///
/// Keep the returned guard alive for as long as file output is wanted;
/// dropping it flushes and stops the background writer.
pub fn init_logging(log_dir: impl AsRef<Path>, json_format: bool) -> WorkerGuard {
    // Log file = <log_dir>/mpc-router.log.{date}
    let file_appender = rolling::daily(log_dir, "mpc-router.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false)
        .with_level(true);

    let file_layer = if json_format {
        fmt::layer()
            .json()
            .with_writer(non_blocking_file)
            .with_current_span(false)
            .with_span_list(false)
            .with_level(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(non_blocking_file)
            .with_ansi(false)
            .with_target(false)
            .with_level(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter())
        .with(stdout_layer)
        .with(file_layer)
        .init();

    guard
}

/// Stdout-only logging. Does nothing if a subscriber is already installed.
pub fn init_console_logging() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(false).with_test_writer())
        .try_init();
}
