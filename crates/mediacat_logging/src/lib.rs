//! Shared logging setup for mediacat binaries.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "mediacat=info,mediacat_db=info";
const VERBOSE_LOG_FILTER: &str = "mediacat=debug,mediacat_db=debug";

/// Logging configuration shared by mediacat binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
}

/// Keeps the background file writer alive. Dropping it flushes pending lines.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize tracing with a daily rolling file writer and stderr output.
///
/// `RUST_LOG` overrides the default filter for both outputs. A log directory
/// that cannot be created only disables the file output.
pub fn init_logging(config: LogConfig<'_>) -> Result<LogGuard> {
    let default_filter = if config.verbose {
        VERBOSE_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let mut file_guard = None;
    let file_layer = match ensure_logs_dir() {
        Ok(log_dir) => {
            let appender =
                tracing_appender::rolling::daily(log_dir, format!("{}.log", config.app_name));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            file_guard = Some(guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(env_filter.clone()),
            )
        }
        Err(err) => {
            eprintln!("Warning: failed to create logs directory: {:#}", err);
            None
        }
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(env_filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LogGuard {
        _file_guard: file_guard,
    })
}

/// Get the mediacat home directory: ~/.mediacat
pub fn mediacat_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("MEDIACAT_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".mediacat")
}

/// Get the logs directory: ~/.mediacat/logs
pub fn logs_dir() -> PathBuf {
    mediacat_home().join("logs")
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}
