//! Logging setup.
//!
//! Console output goes to stderr because stdout carries the filtered TS
//! stream or the JSONL records. An optional file layer with daily rotation
//! can be enabled for long recording sessions. The `log::` macros used
//! throughout the crate are bridged to `tracing`.

use std::fs;
use std::io;
use std::path::Path;

use chrono::Local;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the logging system.
///
/// # Arguments
/// * `verbose` - Enable debug-level logging by default
/// * `log_dir` - Also write daily-rotated log files into this directory
/// * `level` - Explicit filter directive overriding `verbose`
pub fn init_logging(
    verbose: bool,
    log_dir: Option<&Path>,
    level: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let default_level = match level {
        Some(level) => level.to_string(),
        None if verbose => "debug".to_string(),
        None => "info".to_string(),
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let file_appender = tracing_appender::rolling::daily(dir, "recfilter.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            // Keep the writer guard alive for the program lifetime.
            let _ = Box::leak(Box::new(guard));
            Some(
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_target(true)
                    .with_ansi(false)
                    .with_timer(LocalTimeTimer),
            )
        }
        None => None,
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .with_timer(LocalTimeTimer),
        )
        .with(file_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to set default subscriber: {}", e))?;

    // Bridge log:: macros to tracing.
    tracing_log::LogTracer::init().map_err(|e| format!("Failed to initialize LogTracer: {}", e))?;

    Ok(())
}

/// Local-time timestamps in log lines.
#[derive(Debug, Clone, Copy)]
struct LocalTimeTimer;

impl fmt::time::FormatTime for LocalTimeTimer {
    fn format_time(&self, w: &mut fmt::format::Writer) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.6f"))
    }
}
