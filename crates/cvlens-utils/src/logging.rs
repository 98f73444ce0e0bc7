//! # Logging Utilities
//!
//! Logging setup for cvlens using `tracing`.
//!
//! Console output always goes to stderr so that lookup results printed on
//! stdout stay machine-readable.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cvlens_utils::init_logging;
//!
//! // Reads RUST_LOG, CVLENS_LOG_FORMAT and CVLENS_LOG_FILE
//! let _guard = init_logging().expect("Failed to initialize logging");
//!
//! tracing::info!("Application started");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: level filter (e.g. `RUST_LOG=debug`, `RUST_LOG=cvlens_core=trace`)
//! - `CVLENS_LOG_FORMAT`: `pretty` (default) or `json`
//! - `CVLENS_LOG_FILE`: also write a daily-rolled log file at this path
//!
//! The returned [`LoggingGuard`] flushes file output when dropped; keep it
//! alive for the whole run.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::MakeWriter;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Environment variable selecting the output format.
pub const LOG_FORMAT_ENV: &str = "CVLENS_LOG_FORMAT";
/// Environment variable naming an additional log file.
pub const LOG_FILE_ENV: &str = "CVLENS_LOG_FILE";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Human-readable lines (default)
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "text" | "dev" => Ok(LogFormat::Pretty),
            "json" | "prod" => Ok(LogFormat::Json),
            _ => Err(format!("Unknown log format: {s}. Use 'pretty' or 'json'")),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    /// Error level
    Error,
    /// Warning level (default for the CLI)
    Warn,
    /// Info level
    Info,
    /// Debug level
    Debug,
    /// Trace level, logs every directory entry and line lookup
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!(
                "Unknown log level: {s}. Use 'error', 'warn', 'info', 'debug', or 'trace'"
            )),
        }
    }
}

/// Keeps the background file writer alive. Pending lines are flushed on drop.
#[must_use = "dropping the guard stops file logging"]
#[derive(Debug, Default)]
pub struct LoggingGuard
{
    file: Option<WorkerGuard>,
}

impl LoggingGuard
{
    /// Whether a file writer is attached.
    pub fn has_file(&self) -> bool
    {
        self.file.is_some()
    }
}

/// Initialize logging from the environment
///
/// ## Example
///
/// ```rust,no_run
/// use cvlens_utils::init_logging;
///
/// let _guard = init_logging().expect("Failed to initialize logging");
/// tracing::info!("Application started");
/// ```
///
/// ## Errors
///
/// Returns an error if:
/// - Logging is already initialized
/// - `CVLENS_LOG_FORMAT` holds an unknown format
/// - The `CVLENS_LOG_FILE` directory cannot be created
pub fn init_logging() -> Result<LoggingGuard, LoggingError>
{
    let format = match env::var(LOG_FORMAT_ENV) {
        Ok(value) => LogFormat::from_str(&value).map_err(LoggingError::InvalidFormat)?,
        Err(_) => LogFormat::default(),
    };
    let log_file = env::var_os(LOG_FILE_ENV).map(PathBuf::from);

    install(format, None, log_file.as_deref(), true)
}

/// Initialize console logging with an explicit level and format
///
/// `CVLENS_LOG_FILE` is still honored.
///
/// ## Example
///
/// ```rust,no_run
/// use cvlens_utils::{LogFormat, LogLevel, init_logging_with_level};
///
/// let _guard = init_logging_with_level(LogLevel::Debug, LogFormat::Pretty)
///     .expect("Failed to initialize logging");
/// ```
///
/// ## Errors
///
/// Returns an error if logging is already initialized or file logging fails.
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<LoggingGuard, LoggingError>
{
    let log_file = env::var_os(LOG_FILE_ENV).map(PathBuf::from);
    install(format, Some(level.into()), log_file.as_deref(), true)
}

/// Initialize file-only logging
///
/// Nothing is written to the console. With `level` set to `None`, `RUST_LOG`
/// decides, falling back to `INFO`.
///
/// ## Example
///
/// ```rust,no_run
/// use cvlens_utils::{LogFormat, LogLevel, init_logging_to_file};
///
/// let _guard = init_logging_to_file("cvlens.log", LogFormat::Json, Some(LogLevel::Trace))
///     .expect("Failed to initialize logging");
/// ```
///
/// ## Errors
///
/// Returns an error if logging is already initialized or the directory of
/// `path` cannot be created.
pub fn init_logging_to_file(
    path: impl AsRef<Path>,
    format: LogFormat,
    level: Option<LogLevel>,
) -> Result<LoggingGuard, LoggingError>
{
    install(format, level.map(Into::into), Some(path.as_ref()), false)
}

fn install(
    format: LogFormat,
    explicit_level: Option<Level>,
    log_file: Option<&Path>,
    console: bool,
) -> Result<LoggingGuard, LoggingError>
{
    let (layers, guard) = build_layers(format, explicit_level, log_file, console)?;

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;

    if let Some(path) = log_file {
        tracing::debug!("Logging to {}", path.display());
    }
    Ok(guard)
}

/// Console and file layers, each with its own filter, stacked on one registry.
fn build_layers(
    format: LogFormat,
    explicit_level: Option<Level>,
    log_file: Option<&Path>,
    console: bool,
) -> Result<(Vec<BoxedLayer>, LoggingGuard), LoggingError>
{
    let mut layers = Vec::with_capacity(2);
    let mut guard = LoggingGuard::default();

    if console {
        layers.push(format_layer(format, io::stderr, true, build_filter(explicit_level)));
    }
    if let Some(path) = log_file {
        let appender = file_appender(path, console)?;
        let (writer, worker) = tracing_appender::non_blocking(appender);
        guard.file = Some(worker);
        layers.push(format_layer(format, writer, false, build_filter(explicit_level)));
    }

    Ok((layers, guard))
}

/// Explicit level first, then `RUST_LOG`, then `INFO`.
fn build_filter(explicit_level: Option<Level>) -> EnvFilter
{
    match explicit_level {
        Some(level) => EnvFilter::new(level.to_string()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string())),
    }
}

/// Daily rolling next to console output, a single file otherwise.
fn file_appender(path: &Path, rolled: bool) -> Result<RollingFileAppender, LoggingError>
{
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| LoggingError::InvalidPath(path.display().to_string()))?;
    std::fs::create_dir_all(&directory)?;

    if rolled {
        Ok(rolling::daily(&directory, file_name))
    } else {
        Ok(rolling::never(&directory, file_name))
    }
}

fn format_layer<W>(format: LogFormat, writer: W, ansi: bool, filter: EnvFilter) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_writer(writer);

    match format {
        LogFormat::Pretty => layer.with_ansi(ansi).with_filter(filter).boxed(),
        LogFormat::Json => layer
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
    }
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),

    /// Log file path has no file name
    #[error("Invalid log file path: {0}")]
    InvalidPath(String),

    /// A global subscriber is already installed
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}
