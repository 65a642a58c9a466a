//! Diagnostic logging.
//!
//! Station diagnostics go to stderr and to a daily rolling file under the log
//! directory. The per-device audit trail is written separately by
//! [`crate::audit::DeviceLog`].

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FILE_PREFIX: &str = "qcrun.log";

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("qcrun=debug,warn")
        } else {
            EnvFilter::new("qcrun=info,warn")
        }
    })
}

/// Initialize tracing for a station run.
///
/// Controlled by `RUST_LOG`; defaults to INFO for this crate (DEBUG with
/// `verbose`). Keep the returned guard alive until exit so the file writer
/// flushes.
pub fn init(log_dir: Option<&Path>, verbose: bool) -> Option<WorkerGuard> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .compact();

    let dir = log_dir.filter(|dir| std::fs::create_dir_all(dir).is_ok());
    match dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true);

            let result = tracing_subscriber::registry()
                .with(env_filter(verbose))
                .with(stderr_layer)
                .with(file_layer)
                .try_init();
            if let Err(e) = result {
                eprintln!("Warning: could not initialize logging: {}", e);
            }
            Some(guard)
        }
        None => {
            let _ = tracing_subscriber::registry()
                .with(env_filter(verbose))
                .with(stderr_layer)
                .try_init();
            None
        }
    }
}
