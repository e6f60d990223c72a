//! Config file discovery and layered loading.
//!
//! 1. Parse the embedded `defaults.toml`.
//! 2. Merge `/etc/bulwark/config.toml`.
//! 3. Merge `~/.bulwark/config.toml`.
//! 4. Merge the explicit `--config` file, which must exist.
//! 5. Apply `BULWARK_*` fallbacks to fields no file set.
//! 6. Resolve `${VAR}` references.
//! 7. Deserialize and validate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::env::{apply_env_fallbacks, collect_env_vars, resolve_env_references};
use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources, deep_merge_tracking, record_leaves};
use crate::types::Config;
use crate::validate;

const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Largest config file accepted (1 MiB).
pub const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

const SYSTEM_CONFIG_PATH: &str = "/etc/bulwark/config.toml";

/// Inputs to [`load`].
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file. Missing is an error.
    pub explicit: Option<PathBuf>,
    /// System config file. `None` skips the layer.
    pub system: Option<PathBuf>,
    /// Directory holding the user's `config.toml`. `None` skips the layer.
    pub user_dir: Option<PathBuf>,
    /// Environment used for fallbacks and `${VAR}` references.
    pub env: HashMap<String, String>,
}

impl LoadOptions {
    /// Standard locations and the process environment.
    ///
    /// The user layer is skipped when no home directory can be found.
    #[must_use]
    pub fn standard(explicit: Option<&Path>) -> Self {
        Self {
            explicit: explicit.map(Path::to_path_buf),
            system: Some(PathBuf::from(SYSTEM_CONFIG_PATH)),
            user_dir: user_config_dir().ok(),
            env: collect_env_vars(),
        }
    }

    /// Only defaults, `explicit`, and the given environment.
    #[must_use]
    pub fn isolated(explicit: Option<&Path>, env: HashMap<String, String>) -> Self {
        Self {
            explicit: explicit.map(Path::to_path_buf),
            system: None,
            user_dir: None,
            env,
        }
    }
}

/// A loaded configuration with provenance.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// The configuration.
    pub config: Config,
    /// Layer that set each field.
    #[serde(skip)]
    pub field_sources: FieldSources,
    /// Files merged, lowest precedence first.
    pub loaded_files: Vec<String>,
}

impl ResolvedConfig {
    /// Layer that set `field`, if tracked.
    #[must_use]
    pub fn source_of(&self, field: &str) -> Option<&ConfigLayer> {
        self.field_sources.get(field)
    }
}

/// Load configuration with layered precedence.
///
/// # Errors
///
/// Returns a [`ConfigError`] if a file is unreadable, oversized or
/// malformed, or if the merged configuration fails validation.
pub fn load(options: &LoadOptions) -> ConfigResult<ResolvedConfig> {
    let mut merged: toml::Value = toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
        path: "<embedded defaults>".to_owned(),
        source: e,
    })?;
    let mut field_sources = FieldSources::new();
    record_leaves(&merged, "", &ConfigLayer::Defaults, &mut field_sources);
    let mut loaded_files = Vec::new();

    let user_path = options.user_dir.as_ref().map(|d| d.join("config.toml"));
    let optional_layers = [
        (options.system.as_ref(), ConfigLayer::System),
        (user_path.as_ref(), ConfigLayer::User),
    ];
    for (path, layer) in optional_layers {
        let Some(path) = path else {
            continue;
        };
        if let Some(overlay) = try_load_file(path)? {
            deep_merge_tracking(&mut merged, &overlay, "", &layer, &mut field_sources);
            loaded_files.push(path.display().to_string());
            info!(path = %path.display(), %layer, "Loaded config layer");
        }
    }

    if let Some(path) = &options.explicit {
        let overlay = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
            path: path.display().to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })?;
        deep_merge_tracking(&mut merged, &overlay, "", &ConfigLayer::Explicit, &mut field_sources);
        loaded_files.push(path.display().to_string());
        info!(path = %path.display(), "Loaded explicit config");
    }

    let applied = apply_env_fallbacks(&mut merged, &mut field_sources, &options.env);
    if applied > 0 {
        debug!(count = applied, "Applied environment fallbacks");
    }
    resolve_env_references(&mut merged, &options.env);

    let config: Config = merged
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: "<merged config>".to_owned(),
            source: e,
        })?;
    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        field_sources,
        loaded_files,
    })
}

/// Read and parse one file. `Ok(None)` when it does not exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "Config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    let size = content.len() as u64;
    if size > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!("config file is {size} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit"),
        });
    }

    toml::from_str(&content)
        .map(Some)
        .map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            source: e,
        })
}

/// `~/.bulwark`.
fn user_config_dir() -> ConfigResult<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().join(".bulwark"))
        .ok_or(ConfigError::NoHomeDir)
}
