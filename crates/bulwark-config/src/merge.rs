//! Layer merging over raw TOML trees.
//!
//! Merging happens before deserialization so that a key absent from an
//! overlay keeps the value from the layer below instead of being reset to a
//! struct default.

use std::collections::HashMap;

/// Where a configuration value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLayer {
    /// Embedded `defaults.toml`.
    Defaults,
    /// `/etc/bulwark/config.toml`.
    System,
    /// `~/.bulwark/config.toml`.
    User,
    /// File passed with `--config`.
    Explicit,
    /// `BULWARK_*` environment fallback.
    Environment,
}

impl std::fmt::Display for ConfigLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Defaults => write!(f, "defaults"),
            Self::System => write!(f, "system (/etc/bulwark/config.toml)"),
            Self::User => write!(f, "user (~/.bulwark/config.toml)"),
            Self::Explicit => write!(f, "explicit (--config)"),
            Self::Environment => write!(f, "environment variable"),
        }
    }
}

/// Layer that last set each dotted field path.
pub type FieldSources = HashMap<String, ConfigLayer>;

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_owned()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Merge `overlay` into `base`, recording `layer` for every leaf it sets.
///
/// Tables merge key by key. Scalars and arrays replace.
pub fn deep_merge_tracking(
    base: &mut toml::Value,
    overlay: &toml::Value,
    prefix: &str,
    layer: &ConfigLayer,
    sources: &mut FieldSources,
) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let path = join(prefix, key);
                let nested =
                    overlay_val.is_table() && base_table.get(key).is_some_and(toml::Value::is_table);
                if nested && let Some(base_val) = base_table.get_mut(key) {
                    deep_merge_tracking(base_val, overlay_val, &path, layer, sources);
                } else {
                    base_table.insert(key.clone(), overlay_val.clone());
                    record_leaves(overlay_val, &path, layer, sources);
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
            record_leaves(overlay, prefix, layer, sources);
        },
    }
}

/// Record `layer` for every leaf under `val`.
pub fn record_leaves(val: &toml::Value, prefix: &str, layer: &ConfigLayer, sources: &mut FieldSources) {
    if let toml::Value::Table(table) = val {
        for (key, child) in table {
            record_leaves(child, &join(prefix, key), layer, sources);
        }
    } else {
        sources.insert(prefix.to_owned(), layer.clone());
    }
}
