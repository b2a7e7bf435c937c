//! Logging setup built on `tracing` and `tracing-subscriber`.
//!
//! Initialization is configuration-driven: the host config carries a
//! [`LoggingConfig`] and the app calls [`init_from_config`] before anything
//! else logs. Manual setup goes through [`LoggingBuilder`]:
//!
//! ```rust,ignore
//! LoggingBuilder::new()
//!     .with_level(tracing::Level::DEBUG)
//!     .directive("obtura_runtime=trace")
//!     .init();
//! ```

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, EnvFilter};

/// Log verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Converts to `tracing::Level`.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }

    /// Filter directive form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Compact single-line format.
    #[default]
    Compact,
    /// Full verbose format.
    Full,
    /// Human-readable multi-line format.
    Pretty,
}

/// Log output target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    /// Requires `file_path`.
    File,
}

/// Logging configuration, usually part of the host config file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level.
    pub level: LogLevel,
    /// Output format.
    pub format: LogFormat,
    /// Output target.
    pub output: LogOutput,
    /// Include source file and line in output.
    pub file_location: bool,
    /// Include thread ids in output.
    pub thread_ids: bool,
    /// Module-specific level overrides, e.g. `{ "obtura_runtime": "debug" }`.
    pub filters: HashMap<String, LogLevel>,
    /// Log file path (only used when output is `file`).
    pub file_path: Option<PathBuf>,
}

/// Initializes logging from a [`LoggingConfig`].
///
/// Safe to call more than once; only the first initialization wins.
pub fn init_from_config(config: &LoggingConfig) {
    let _ = LoggingBuilder::from_config(config).try_init();
}

/// Builder for manual logging setup.
#[derive(Default)]
pub struct LoggingBuilder {
    directives: Vec<String>,
    level: Option<tracing::Level>,
    format: LogFormat,
    output: LogOutput,
    with_file: bool,
    with_thread_ids: bool,
    file_path: Option<PathBuf>,
}

impl LoggingBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder from a [`LoggingConfig`].
    pub fn from_config(config: &LoggingConfig) -> Self {
        let mut builder = Self::new();
        builder.level = Some(config.level.to_tracing_level());
        builder.format = config.format;
        builder.output = config.output;
        builder.with_file = config.file_location;
        builder.with_thread_ids = config.thread_ids;
        builder.file_path.clone_from(&config.file_path);
        for (module, level) in &config.filters {
            builder.directives.push(format!("{module}={}", level.as_str()));
        }
        builder
    }

    /// Sets the global log level.
    pub fn with_level(mut self, level: tracing::Level) -> Self {
        self.level = Some(level);
        self
    }

    /// Adds a filter directive, e.g. `"obtura_runtime=debug"`.
    pub fn directive(mut self, directive: &str) -> Self {
        self.directives.push(directive.to_string());
        self
    }

    /// Sets the output format.
    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the output target.
    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    fn build_filter(&self) -> EnvFilter {
        let base = self
            .level
            .unwrap_or(tracing::Level::INFO)
            .to_string()
            .to_lowercase();

        // RUST_LOG wins over the configured base level.
        let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(base));
        for directive in &self.directives {
            if let Ok(d) = directive.parse() {
                filter = filter.add_directive(d);
            }
        }
        filter
    }

    /// Initializes the subscriber, ignoring failure if one is already set.
    pub fn init(self) {
        let _ = self.try_init();
    }

    /// Initializes the subscriber, returning an error if one is already set.
    pub fn try_init(self) -> Result<(), TryInitError> {
        let filter = self.build_filter();

        macro_rules! init_with_writer {
            ($writer:expr) => {
                match self.format {
                    LogFormat::Compact => tracing_subscriber::registry()
                        .with(
                            fmt::layer()
                                .compact()
                                .with_file(self.with_file)
                                .with_line_number(self.with_file)
                                .with_thread_ids(self.with_thread_ids)
                                .with_writer($writer),
                        )
                        .with(filter)
                        .try_init(),
                    LogFormat::Full => tracing_subscriber::registry()
                        .with(
                            fmt::layer()
                                .with_file(self.with_file)
                                .with_line_number(self.with_file)
                                .with_thread_ids(self.with_thread_ids)
                                .with_writer($writer),
                        )
                        .with(filter)
                        .try_init(),
                    LogFormat::Pretty => tracing_subscriber::registry()
                        .with(
                            fmt::layer()
                                .pretty()
                                .with_file(self.with_file)
                                .with_line_number(self.with_file)
                                .with_thread_ids(self.with_thread_ids)
                                .with_writer($writer),
                        )
                        .with(filter)
                        .try_init(),
                }
            };
        }

        match self.output {
            LogOutput::Stdout => init_with_writer!(std::io::stdout),
            LogOutput::Stderr => init_with_writer!(std::io::stderr),
            LogOutput::File => {
                if let Some(path) = &self.file_path {
                    let appender = tracing_appender::rolling::never(
                        path.parent().unwrap_or_else(|| Path::new(".")),
                        path.file_name().unwrap_or_else(|| OsStr::new("obtura.log")),
                    );
                    init_with_writer!(appender)
                } else {
                    warn!("file output requested without a file path, falling back to stdout");
                    init_with_writer!(std::io::stdout)
                }
            }
        }
    }
}
