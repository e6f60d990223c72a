//! Subscriber configuration and installation.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_appender::rolling;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::error::{TelemetryError, TelemetryResult};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human oriented.
    Pretty,
    /// One line per event, abbreviated.
    #[default]
    Compact,
    /// Newline-delimited JSON.
    Json,
    /// One line per event, every field.
    Full,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Standard output.
    Stdout,
    /// Standard error.
    #[default]
    Stderr,
    /// Daily-rotated files under [`LogConfig::directory`].
    File,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Base level filter, e.g. `info`.
    pub level: String,
    /// Line format.
    pub format: LogFormat,
    /// Sink.
    pub target: LogTarget,
    /// Directory for [`LogTarget::File`].
    pub directory: PathBuf,
    /// File name prefix for [`LogTarget::File`].
    pub file_prefix: String,
    /// Extra per-target directives such as `bulwark_sql=debug`.
    pub directives: Vec<String>,
    /// Prefix each line with a timestamp.
    pub timestamps: bool,
    /// Colorize output. Ignored for files.
    pub ansi: bool,
    /// Record source file and line.
    pub file_info: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            directory: PathBuf::from("logs"),
            file_prefix: "bulwark".to_string(),
            directives: Vec::new(),
            timestamps: true,
            ansi: true,
            file_info: false,
        }
    }
}

impl LogConfig {
    /// Default configuration at `level`.
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Self::default()
        }
    }

    /// Set the format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the sink.
    #[must_use]
    pub fn with_target(mut self, target: LogTarget) -> Self {
        self.target = target;
        self
    }

    /// Write daily-rotated files under `directory`.
    #[must_use]
    pub fn with_file(mut self, directory: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        self.target = LogTarget::File;
        self.directory = directory.into();
        self.file_prefix = prefix.into();
        self.ansi = false;
        self
    }

    /// Add a per-target directive.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Drop timestamps.
    #[must_use]
    pub fn without_timestamps(mut self) -> Self {
        self.timestamps = false;
        self
    }

    /// Drop colors.
    #[must_use]
    pub fn without_ansi(mut self) -> Self {
        self.ansi = false;
        self
    }

    /// Record source locations.
    #[must_use]
    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    fn filter(&self) -> TelemetryResult<EnvFilter> {
        let mut filter = EnvFilter::try_new(&self.level)
            .map_err(|e| TelemetryError::InvalidFilter(format!("{}: {e}", self.level)))?;
        for directive in &self.directives {
            let parsed = directive
                .parse()
                .map_err(|e| TelemetryError::InvalidFilter(format!("{directive}: {e}")))?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }

    fn layer<W>(&self, writer: W, ansi: bool) -> BoxedLayer
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let base = fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_file(self.file_info)
            .with_line_number(self.file_info);

        match (self.format, self.timestamps) {
            (LogFormat::Pretty, true) => base.pretty().boxed(),
            (LogFormat::Pretty, false) => base.pretty().without_time().boxed(),
            (LogFormat::Compact, true) => base.compact().boxed(),
            (LogFormat::Compact, false) => base.compact().without_time().boxed(),
            (LogFormat::Json, true) => base.json().boxed(),
            (LogFormat::Json, false) => base.json().without_time().boxed(),
            (LogFormat::Full, true) => base.boxed(),
            (LogFormat::Full, false) => base.without_time().boxed(),
        }
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidFilter`] for an unparseable level or
/// directive, [`TelemetryError::Io`] if the log directory cannot be created,
/// and [`TelemetryError::Init`] if a subscriber is already installed.
pub fn setup_logging(config: &LogConfig) -> TelemetryResult<()> {
    let filter = config.filter()?;
    let layer = match config.target {
        LogTarget::Stdout => config.layer(std::io::stdout, config.ansi),
        LogTarget::Stderr => config.layer(std::io::stderr, config.ansi),
        LogTarget::File => {
            std::fs::create_dir_all(&config.directory)?;
            let appender = rolling::daily(&config.directory, &config.file_prefix);
            config.layer(appender, false)
        },
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))
}

/// Install the default subscriber: `info`, compact, stderr.
///
/// # Errors
///
/// See [`setup_logging`].
pub fn setup_default_logging() -> TelemetryResult<()> {
    setup_logging(&LogConfig::default())
}
