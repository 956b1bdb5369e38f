//! Logging configuration using the tracing ecosystem.
//!
//! This module configures structured logging with:
//! - Human-readable output on stderr, so stdout stays clean for JSON
//! - Optional daily-rotated log files
//! - Environment-based log level configuration

use std::path::Path;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Default log level if RUST_LOG is not set.
const DEFAULT_LOG_FILTER: &str = "lighthouse=info,warn";

/// File name prefix of rotated log files.
const LOG_FILE_PREFIX: &str = "lighthouse.log";

/// The filter directive for a `-v` count when RUST_LOG is unset.
fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => DEFAULT_LOG_FILTER,
        1 => "lighthouse=debug,info",
        _ => "lighthouse=trace,debug",
    }
}

/// Initialize the logging system.
///
/// `RUST_LOG` wins over `verbosity`. When `log_dir` is given, a second
/// layer writes to a daily rotating file in that directory.
///
/// # Log Levels
///
/// - `RUST_LOG=debug` - Verbose output for debugging
/// - `RUST_LOG=lighthouse=trace` - Every request and page fetch
///
/// # Errors
///
/// Returns an error if the log directory cannot be created or the global
/// subscriber is already set.
pub fn init(verbosity: u8, log_dir: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_PREFIX);
            Some(
                fmt::layer()
                    .with_writer(appender)
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
        }
        None => None,
    };

    let subscriber = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbosity > 0),
        )
        .with(file_layer)
        .with(filter);

    tracing::subscriber::set_global_default(subscriber)?;

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "Logging initialized");
    if let Some(dir) = log_dir {
        tracing::debug!(log_dir = %dir.display(), "Log directory");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_by_verbosity() {
        assert_eq!(default_filter(0), "lighthouse=info,warn");
        assert_eq!(default_filter(1), "lighthouse=debug,info");
        assert_eq!(default_filter(5), "lighthouse=trace,debug");
    }

    #[test]
    fn test_filters_parse() {
        for verbosity in 0..3 {
            assert!(EnvFilter::try_new(default_filter(verbosity)).is_ok());
        }
    }
}
