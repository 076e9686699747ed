//! # pgcast-logging
//!
//! Structured logging with `tracing`.
//!
//! [`init_logging`] installs the process-wide subscriber once at startup:
//! a console layer on stderr plus, when a directory is configured, a
//! rotating file layer written through a non-blocking worker. Both layers
//! print `[timestamp] [level] [label] message` lines.
//!
//! Components never build their own logger; they emit through the
//! `tracing` macros and whichever subscriber is installed receives them.
//! Tests install [`capture_logs`] instead.

#![deny(unsafe_code)]

pub mod capture;
pub mod format;

pub use capture::{capture_logs, CapturedEvent, CapturedLogs};
pub use format::LineFormat;

use std::io::IsTerminal;
use std::path::PathBuf;

use pgcast_settings::{LogRotation, LoggingSettings};
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter `{directive}`: {reason}")]
    Filter { directive: String, reason: String },
    #[error("failed to prepare log directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to open rolling log file: {0}")]
    Appender(String),
    #[error("global subscriber already installed: {0}")]
    AlreadyInitialized(String),
}

/// Resolved logging configuration.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// Default filter directive, used when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for the rolling file; `None` disables file output.
    pub directory: Option<PathBuf>,
    pub file_name: String,
    pub rotation: LogRotation,
    pub label: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::from(&LoggingSettings::default())
    }
}

impl From<&LoggingSettings> for LoggingConfig {
    fn from(settings: &LoggingSettings) -> Self {
        Self {
            level: settings.level.clone(),
            directory: settings.directory.as_ref().map(PathBuf::from),
            file_name: settings.file_name.clone(),
            rotation: settings.rotation,
            label: settings.label.clone(),
        }
    }
}

/// Keeps the non-blocking file writer alive. Dropping it flushes pending lines.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
    file_path: Option<PathBuf>,
}

impl LoggingGuard {
    /// Directory and file prefix of the rolling log, if file output is on.
    pub fn file_path(&self) -> Option<&PathBuf> {
        self.file_path.as_ref()
    }
}

/// Install the global subscriber. Call once at startup.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError> {
    let filter = build_filter(&config.level)?;

    // Colors only when stderr is a terminal, not a redirected file or pipe.
    let console = fmt::layer()
        .event_format(LineFormat::new(&config.label))
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr);

    let (file_layer, file_guard, file_path) = match &config.directory {
        Some(dir) => {
            let appender = build_appender(config, dir)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .event_format(LineFormat::new(&config.label))
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard), Some(dir.join(&config.file_name)))
        }
        None => (None, None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
        file_path,
    })
}

/// `RUST_LOG` wins; otherwise the configured directive.
fn build_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|e| LoggingError::Filter {
        directive: level.to_string(),
        reason: e.to_string(),
    })
}

fn build_appender(
    config: &LoggingConfig,
    dir: &std::path::Path,
) -> Result<RollingFileAppender, LoggingError> {
    std::fs::create_dir_all(dir)?;
    RollingFileAppender::builder()
        .rotation(rotation(config.rotation))
        .filename_prefix(&config.file_name)
        .build(dir)
        .map_err(|e| LoggingError::Appender(e.to_string()))
}

fn rotation(rotation: LogRotation) -> Rotation {
    match rotation {
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Never => Rotation::NEVER,
    }
}
