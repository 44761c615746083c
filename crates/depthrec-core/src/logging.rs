//! Logging initialization using the `tracing` ecosystem.
//!
//! - Console output (human-readable, with thread ids so the writer thread is
//!   distinguishable from the runtime workers)
//! - Optional file output, rotated daily via `tracing-appender`
//! - Level from `RUST_LOG` if set, otherwise the explicit default

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global tracing subscriber. Call once at program start.
///
/// - `log_level`: default filter if `RUST_LOG` is unset (e.g. `"info"`)
/// - `log_dir`: directory for daily-rotating log files
/// - `module_name`: log file prefix (e.g. `"depthrec"`)
///
/// When file logging is enabled the returned guard must be held for the
/// lifetime of the program; dropping it flushes and stops the file writer.
pub fn init_logging(log_level: &str, log_dir: Option<&str>, module_name: &str) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let console_layer = fmt::layer().with_target(true).with_thread_ids(true).with_ansi(true);

    match log_dir {
        Some(dir) => {
            let (file_writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, module_name));
            let file_layer = fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true);

            tracing_subscriber::registry().with(env_filter).with(console_layer).with(file_layer).init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(env_filter).with(console_layer).init();
            None
        }
    }
}
