//! Logging setup for the engine and the `tfe` binary.
//!
//! Structured logging through `tracing`. Output goes to stderr (or a rolling
//! file) so that command results on stdout stay machine-readable.

use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Rotated log files older than this are pruned at startup.
pub const LOG_RETENTION_DAYS: u32 = 7;

/// Logging configuration options
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum log level to output
    pub level: Level,
    /// Enable colored output
    pub color: bool,
    /// Show timestamps
    pub show_timestamps: bool,
    /// Show target/module name
    pub show_target: bool,
    /// Enable JSON format for machine parsing
    pub json_format: bool,
    /// Enable span events for tracing
    pub enable_spans: bool,
    /// Daily-rolling log file instead of stderr
    pub file_output: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::for_mode(ApplicationMode::Cli)
    }
}

impl LoggingConfig {
    pub fn for_mode(mode: ApplicationMode) -> Self {
        match mode {
            ApplicationMode::Cli => Self {
                level: Level::WARN,
                color: io::stderr().is_terminal(),
                show_timestamps: false,
                show_target: false,
                json_format: false,
                enable_spans: false,
                file_output: None,
            },
            // Unattended runs (cron sweeps of `recur due`) keep a file trail.
            ApplicationMode::Sweep => Self {
                level: Level::INFO,
                color: false,
                show_timestamps: true,
                show_target: true,
                json_format: false,
                enable_spans: false,
                file_output: log_file_path(mode),
            },
            ApplicationMode::Test => Self {
                level: Level::DEBUG,
                color: false,
                show_timestamps: true,
                show_target: true,
                json_format: false,
                enable_spans: true,
                file_output: None,
            },
        }
    }

    /// Create config from CLI arguments
    pub fn from_args(quiet: bool, verbose: bool, json: bool) -> Self {
        let level = if verbose {
            Level::DEBUG
        } else if quiet {
            Level::ERROR
        } else {
            Level::WARN
        };

        Self {
            level,
            color: !quiet && !json && io::stderr().is_terminal(),
            show_timestamps: verbose || json,
            show_target: verbose,
            json_format: json,
            enable_spans: verbose,
            file_output: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationMode {
    /// Interactive commands
    Cli,
    /// Unattended materialization runs
    Sweep,
    /// Maximum detail for tests
    Test,
}

/// Initialize the global subscriber. Fails if one is already installed.
pub fn init_logging(config: LoggingConfig) -> io::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("taskflow_engine={}", config.level)));

    let registry = Registry::default().with(env_filter);

    let result = if let Some(log_file) = config.file_output {
        let dir = log_file
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Invalid log file path"))?;
        let name = log_file
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Invalid log file name"))?;
        std::fs::create_dir_all(dir)?;
        cleanup_old_logs(dir, LOG_RETENTION_DAYS)?;

        let file_appender = tracing_appender::rolling::daily(dir, name);

        if config.json_format {
            fmt::layer()
                .json()
                .with_current_span(config.enable_spans)
                .with_span_events(FmtSpan::CLOSE)
                .with_writer(file_appender)
                .with_subscriber(registry)
                .try_init()
        } else {
            fmt::layer()
                .with_target(config.show_target)
                .with_level(true)
                .with_ansi(false)
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_writer(file_appender)
                .with_subscriber(registry)
                .try_init()
        }
    } else if config.json_format {
        fmt::layer()
            .json()
            .with_current_span(config.enable_spans)
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(io::stderr)
            .with_subscriber(registry)
            .try_init()
    } else {
        let fmt_layer = fmt::layer()
            .with_target(config.show_target)
            .with_level(true)
            .with_ansi(config.color)
            .with_writer(io::stderr);

        if config.show_timestamps {
            fmt_layer
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_subscriber(registry)
                .try_init()
        } else {
            fmt_layer.without_time().with_subscriber(registry).try_init()
        }
    };

    result.map_err(|e| io::Error::other(e.to_string()))
}

fn env_flag(name: &str) -> bool {
    matches!(std::env::var(name).as_deref(), Ok("true") | Ok("1"))
}

/// Initialize logging from `TFE_LOG_*` environment variables
pub fn init_from_env() -> io::Result<()> {
    let json = env_flag("TFE_LOG_JSON");
    let verbose = env_flag("TFE_LOG_VERBOSE");
    let quiet = env_flag("TFE_LOG_QUIET");

    let mut config = LoggingConfig::from_args(quiet, verbose, json);
    if env_flag("TFE_LOG_FILE") {
        config.file_output = log_file_path(ApplicationMode::Sweep);
    }
    init_logging(config)
}

/// Remove rotated log files (`*.log.YYYY-MM-DD`) older than `retention_days`.
pub fn cleanup_old_logs(log_dir: &Path, retention_days: u32) -> io::Result<()> {
    use std::fs;
    use std::time::{Duration, SystemTime};

    if !log_dir.exists() {
        return Ok(());
    }

    let now = SystemTime::now();
    let retention = Duration::from_secs(u64::from(retention_days) * 24 * 60 * 60);
    let mut cleaned_count = 0;

    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();

        if !path.to_string_lossy().contains(".log.") || !path.is_file() {
            continue;
        }

        let modified = entry.metadata()?.modified()?;
        let Ok(age) = now.duration_since(modified) else {
            continue;
        };
        if age <= retention {
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => cleaned_count += 1,
            Err(e) => tracing::warn!("Failed to remove old log file {}: {}", path.display(), e),
        }
    }

    if cleaned_count > 0 {
        tracing::info!(cleaned_count, "Log cleanup completed");
    }

    Ok(())
}

#[macro_export]
macro_rules! log_task_operation {
    ($operation:expr, $task_id:expr) => {
        tracing::info!(operation = $operation, task_id = %$task_id, "Task operation");
    };
    ($operation:expr, $task_id:expr, $details:expr) => {
        tracing::info!(
            operation = $operation,
            task_id = %$task_id,
            details = %$details,
            "Task operation"
        );
    };
}

#[macro_export]
macro_rules! log_dependency_operation {
    ($operation:expr, $dependent:expr, $blocking:expr) => {
        tracing::info!(
            operation = $operation,
            dependent_task_id = %$dependent,
            blocking_task_id = %$blocking,
            "Dependency operation"
        );
    };
}

/// Structured error logging
#[macro_export]
macro_rules! log_error {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            code = $error.to_error_code(),
            context = $context,
            "Operation failed"
        );
    };
}

/// Log file for a mode, under `~/.taskflow/logs`. `None` without a home directory.
pub fn log_file_path(mode: ApplicationMode) -> Option<PathBuf> {
    let log_dir = dirs::home_dir()?.join(".taskflow").join("logs");

    Some(match mode {
        ApplicationMode::Cli => log_dir.join("cli.log"),
        ApplicationMode::Sweep => log_dir.join("sweep.log"),
        ApplicationMode::Test => log_dir.join("test.log"),
    })
}
