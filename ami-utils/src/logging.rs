//! Logging infrastructure for amibridge
//!
//! Provides unified logging setup using the tracing ecosystem.

use std::path::PathBuf;

use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use crate::{AmiError, Result};

/// Log output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    /// Log to stderr (default for the bridge; it runs under a supervisor
    /// that captures stderr)
    Stderr,
    /// Append to a log file at the given path
    File(PathBuf),
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Output destination
    pub output: LogOutput,
    /// Log level filter (e.g., "info", "ami_manager=debug,tokio=warn")
    pub filter: String,
    /// Include file/line in logs
    pub file_line: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            output: LogOutput::Stderr,
            filter: std::env::var("AMIBRIDGE_LOG").unwrap_or_else(|_| "info".into()),
            file_line: false,
        }
    }
}

impl LogConfig {
    /// Create config for development (verbose stderr)
    pub fn development() -> Self {
        Self {
            output: LogOutput::Stderr,
            filter: "debug".into(),
            file_line: true,
        }
    }

    /// Create config logging to a file
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            output: LogOutput::File(path.into()),
            ..Self::default()
        }
    }
}

/// Initialize logging with default configuration
///
/// Uses AMIBRIDGE_LOG env var for filter, defaults to "info"
pub fn init_logging() -> Result<()> {
    init_logging_with_config(LogConfig::default())
}

/// Initialize logging with custom configuration
pub fn init_logging_with_config(config: LogConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| AmiError::config(format!("Invalid log filter: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_file(config.file_line)
        .with_line_number(config.file_line);

    match config.output {
        LogOutput::Stderr => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer.with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| AmiError::internal(format!("Failed to init logging: {}", e)))?;
        }
        LogOutput::File(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer.with_writer(file).with_ansi(false))
                .try_init()
                .map_err(|e| AmiError::internal(format!("Failed to init logging: {}", e)))?;
        }
    }

    Ok(())
}
