use std::path::Path;
use tracing_appender::rolling;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Name of the daily rotated log file
pub const LOG_FILE_NAME: &str = "taskweave.log";

/// Installs the global subscriber.
///
/// Falls back to `info` when `log_level` is not a valid filter directive.
/// Logs go to stderr so that command output on stdout stays parseable.
///
/// # Arguments
///
/// * `log_level` - Filter directive (e.g. "info", "taskweave=debug")
/// * `log_dir` - Also write a daily rotating file in this directory
pub fn init_logging(log_level: &str, log_dir: Option<&Path>) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| {
        eprintln!("Invalid log level '{}', defaulting to 'info'", log_level);
        EnvFilter::new("info")
    });

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let file_layer = log_dir.map(|dir| {
        fmt::layer()
            .with_ansi(false)
            .with_line_number(true)
            .with_writer(rolling::daily(dir, LOG_FILE_NAME))
    });

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();
    if let Err(e) = installed {
        eprintln!("Logging already initialized: {}", e);
    }
}
