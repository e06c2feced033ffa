//! Logging configuration and initialization for hoard.
//!
//! The filter is taken from `HOARD_LOG` when set. Otherwise it is built from
//! the configured level, a few quieter defaults for chatty dependencies, and
//! the configured extra directives, in that order.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::Result;

/// Environment variable holding a complete filter, e.g. `hoard=debug,sqlx=info`.
pub const LOG_ENV: &str = "HOARD_LOG";

/// sqlx logs every statement at info.
const QUIET_TARGETS: &[&str] = &["sqlx=warn"];

/// Parse log level string to tracing Level.
fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Join the configured level and directives into one filter string.
fn filter_directives(config: &LoggingConfig) -> String {
    let level = parse_level(&config.level).as_str().to_lowercase();

    std::iter::once(level)
        .chain(QUIET_TARGETS.iter().map(|d| d.to_string()))
        .chain(
            config
                .directives
                .iter()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
        )
        .collect::<Vec<_>>()
        .join(",")
}

fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(filter_directives(config)))
}

/// Initialize the logging system with the given configuration.
///
/// Output goes to stdout and is appended to the configured log file.
pub fn init(config: &LoggingConfig) -> Result<()> {
    if let Some(parent) = Path::new(&config.file).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let log_file = Arc::new(
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.file)?,
    );
    let writer = std::io::stdout.and(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
        .with(build_filter(config))
        .init();

    Ok(())
}

/// Initialize console-only logging (for development/testing).
pub fn init_console_only(config: &LoggingConfig) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_ansi(true)
                .with_target(true),
        )
        .with(build_filter(config))
        .init();
}
