use std::path::Path;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize structured logging for the daemon.
///
/// `log_level` becomes the default filter directive (overridable through
/// `RUST_LOG`). When `log_file` is set, a non-blocking file writer is layered
/// in next to stdout; the returned guard must be held for the lifetime of the
/// process or buffered lines are lost on exit.
pub fn init_logging(
    log_level: &str,
    log_file: Option<&Path>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match EnvFilter::try_new(log_level) {
            Ok(f) => f,
            Err(_) => {
                eprintln!("Invalid log level '{}', defaulting to 'info'", log_level);
                EnvFilter::new("info")
            }
        },
    };

    let stdout_layer = fmt::layer().with_target(false);

    match log_file {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "dispatchd.log".to_string());
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer().with_ansi(false).with_writer(writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .with(file_layer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .init();
            None
        }
    }
}
