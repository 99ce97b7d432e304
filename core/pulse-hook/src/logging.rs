//! Structured logging for pulse-hook using tracing.
//!
//! Logs to `~/.wakatime/pulse-hook.{date}.log` with automatic daily rotation.
//! Keeps 7 days of logs. `RUST_LOG` overrides the level; otherwise the
//! `debug` setting picks between info and debug.
//!
//! Falls back to stderr logging if file appender creation fails. Stdout is
//! never used: it carries host commands.

use fs_err as fs;
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init(log_dir: &Path, debug: bool) {
    let _ = fs::create_dir_all(log_dir);

    let default_filter = if debug {
        "pulse_hook=debug,pulse_core=debug"
    } else {
        "pulse_hook=info,pulse_core=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    match create_file_appender(log_dir) {
        Ok(file_appender) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // The guard flushes on drop; keep it for the life of the process.
            std::mem::forget(guard);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_writer(non_blocking)
                        .with_timer(fmt::time::UtcTime::rfc_3339())
                        .with_ansi(false),
                )
                .init();
        }
        Err(_) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_timer(fmt::time::UtcTime::rfc_3339())
                        .with_ansi(false),
                )
                .init();
        }
    }
}

fn create_file_appender(
    log_dir: &Path,
) -> Result<RollingFileAppender, tracing_appender::rolling::InitError> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("pulse-hook")
        .filename_suffix("log")
        .max_log_files(7)
        .build(log_dir)
}
