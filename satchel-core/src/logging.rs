//! Logging setup for satchel applications
//!
//! Library code logs through the `tracing` macros re-exported here. An
//! application installs a subscriber once at startup with [`LogConfig`].
//! Output defaults to JSON on STDOUT.
//!
//! # Examples
//!
//! ```no_run
//! use satchel_core::logging::*;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let _guard = LogConfig::new()
//!         .level(LogLevel::Debug)
//!         .format(LogFormat::Pretty)
//!         .init()?;
//!
//!     info!("sessions ready");
//!     Ok(())
//! }
//! ```
//!
//! The `SATCHEL_LOG` environment variable, when set, replaces the configured
//! level with an `EnvFilter` directive such as `satchel_session=debug`.

use std::io;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub use tracing::{debug, error, info, trace, warn};

/// Environment variable consulted for a filter directive
pub const LOG_ENV: &str = "SATCHEL_LOG";

/// Log level for filtering messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing Level
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    /// Directive string for EnvFilter
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Structured, machine-readable (default)
    Json,
    Plain,
    /// Multi-line, for local development
    Pretty,
    Compact,
}

/// Output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// Append to a file at this path
    File(String),
}

/// Subscriber configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Include target (module path)
    pub targets: bool,
    pub thread_ids: bool,
    /// Enable ANSI colors (ignored for JSON)
    pub colors: bool,
    /// Explicit filter directive; takes precedence over `level`
    pub env_filter: Option<String>,
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_targets(mut self, enable: bool) -> Self {
        self.targets = enable;
        self
    }

    pub fn with_thread_ids(mut self, enable: bool) -> Self {
        self.thread_ids = enable;
        self
    }

    pub fn with_colors(mut self, enable: bool) -> Self {
        self.colors = enable;
        self
    }

    /// Set a filter such as `"satchel_session=debug,redis=warn"`
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Resolve the effective filter: explicit directive, then `SATCHEL_LOG`,
    /// then the configured level.
    fn filter(&self) -> EnvFilter {
        if let Some(directive) = &self.env_filter
            && let Ok(filter) = EnvFilter::try_new(directive)
        {
            return filter;
        }

        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))
    }

    /// Install the global subscriber.
    ///
    /// The returned guard flushes buffered lines when dropped and must be
    /// kept alive for the life of the program. If a global subscriber is
    /// already installed the existing one is kept.
    pub fn init(self) -> io::Result<WorkerGuard> {
        let filter = self.filter();

        let (writer, guard) = match &self.output {
            LogOutput::Stdout => tracing_appender::non_blocking(io::stdout()),
            LogOutput::Stderr => tracing_appender::non_blocking(io::stderr()),
            LogOutput::File(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                tracing_appender::non_blocking(file)
            }
        };

        let registry = tracing_subscriber::registry().with(filter);
        let base = fmt::layer()
            .with_writer(writer)
            .with_target(self.targets)
            .with_thread_ids(self.thread_ids);

        let installed = match self.format {
            LogFormat::Json => registry.with(base.json()).try_init(),
            LogFormat::Plain => registry.with(base.with_ansi(self.colors)).try_init(),
            LogFormat::Pretty => registry
                .with(base.pretty().with_ansi(self.colors))
                .try_init(),
            LogFormat::Compact => registry
                .with(base.compact().with_ansi(self.colors))
                .try_init(),
        };

        if installed.is_err() {
            debug!("global subscriber already installed, keeping it");
        }

        Ok(guard)
    }
}

impl Default for LogConfig {
    /// JSON to STDOUT at INFO level
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Json,
            output: LogOutput::Stdout,
            targets: true,
            thread_ids: false,
            colors: false,
            env_filter: None,
        }
    }
}
