use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{Result, VidshrinkError};

pub const LOG_FILE_NAME: &str = "vidshrink.log";

/// `.vidshrink/log` under the working directory
pub fn default_log_dir() -> Result<PathBuf> {
    Ok(std::env::current_dir()?.join(".vidshrink").join("log"))
}

/// `--debug` wins, otherwise the configured level name
pub fn resolve_level(debug: bool, configured: &str) -> Result<Level> {
    if debug {
        return Ok(Level::DEBUG);
    }
    configured
        .parse()
        .map_err(|_| VidshrinkError::Config(format!("Unknown log level '{}'", configured)))
}

/// Setup logging to both console and a daily rolling file
pub fn setup_logging(level: Level, log_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = rolling::daily(log_dir, LOG_FILE_NAME);
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the writer alive for the duration of the program
    std::mem::forget(guard);

    let console_layer = fmt::layer()
        .with_target(false)
        .with_file(level == Level::DEBUG)
        .with_line_number(level == Level::DEBUG);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| VidshrinkError::Config(format!("Failed to initialize logging: {}", e)))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        level,
        log_dir.join(LOG_FILE_NAME).display()
    );

    Ok(())
}
