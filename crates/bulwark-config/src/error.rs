use std::io;

use thiserror::Error;

/// Configuration error type.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration file could not be read.
    #[error("failed to read config file at {path}: {source}")]
    ReadError {
        /// Offending file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A configuration file is not valid TOML, or the merged tree does not
    /// match the schema.
    #[error("failed to parse config at {path}: {source}")]
    ParseError {
        /// Offending file, or `<merged config>`.
        path: String,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range or inconsistent with another.
    #[error("invalid value for '{field}': {message}")]
    ValidationError {
        /// Dotted field path.
        field: String,
        /// What is wrong.
        message: String,
    },

    /// The home directory could not be determined.
    #[error("could not determine home directory")]
    NoHomeDir,
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.to_owned(),
            message: message.into(),
        }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
