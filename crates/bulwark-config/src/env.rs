//! Environment fallbacks and `${VAR}` references.
//!
//! Environment variables are fallbacks: a mapping applies only to a field no
//! file layer set. The environment is always passed in as a map so callers
//! (and tests) decide what it contains.

use std::collections::HashMap;
use std::hash::BuildHasher;

use tracing::debug;

use crate::merge::{ConfigLayer, FieldSources};

/// Kind a mapped variable is coerced to before insertion.
#[derive(Clone, Copy)]
enum Kind {
    Str,
    Int,
    Bool,
    List,
}

/// Environment variable to field path.
const ENV_MAPPINGS: &[(&str, &str, Kind)] = &[
    ("BULWARK_LOG_LEVEL", "logging.level", Kind::Str),
    ("BULWARK_LOG_FORMAT", "logging.format", Kind::Str),
    ("BULWARK_BIND", "gateway.bind", Kind::Str),
    ("BULWARK_MAX_BATCH_SIZE", "storage.max_batch_size", Kind::Int),
    ("BULWARK_KV_NAMESPACE", "storage.kv_namespace", Kind::Str),
    ("BULWARK_RATE_LIMIT_PER_MINUTE", "rate_limits.default_limit_per_minute", Kind::Int),
    ("BULWARK_RATE_LIMIT_BURST", "rate_limits.default_burst", Kind::Int),
    ("BULWARK_GLOBAL_CEILING", "quota.global_ceiling", Kind::Int),
    ("BULWARK_PRIMARY_ENDPOINT", "primary.endpoint", Kind::Str),
    ("BULWARK_PRIMARY_API_TOKEN", "primary.api_token", Kind::Str),
    ("BULWARK_PRIMARY_TIMEOUT_SECS", "primary.timeout_secs", Kind::Int),
    ("BULWARK_FAILOVER_ENABLED", "failover.enabled", Kind::Bool),
    ("BULWARK_FAILOVER_LIMIT_MARKERS", "failover.limit_markers", Kind::List),
];

/// Apply environment fallbacks to fields no file set. Returns how many were
/// applied.
///
/// Values that cannot be coerced to the field's type are inserted as
/// strings and rejected later by deserialization.
pub fn apply_env_fallbacks<S: BuildHasher>(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env: &HashMap<String, String, S>,
) -> usize {
    let mut applied: usize = 0;
    for (var, path, kind) in ENV_MAPPINGS {
        if sources.get(*path).is_some_and(|layer| *layer != ConfigLayer::Defaults) {
            continue;
        }
        let Some(raw) = env.get(*var) else {
            continue;
        };
        debug!(var, field = path, "Applying environment fallback");
        set_path(merged, path, coerce(raw, *kind));
        sources.insert((*path).to_owned(), ConfigLayer::Environment);
        applied = applied.saturating_add(1);
    }
    applied
}

fn coerce(raw: &str, kind: Kind) -> toml::Value {
    match kind {
        Kind::Int => raw
            .trim()
            .parse::<i64>()
            .map_or_else(|_| toml::Value::String(raw.to_owned()), toml::Value::Integer),
        Kind::Bool => raw
            .trim()
            .parse::<bool>()
            .map_or_else(|_| toml::Value::String(raw.to_owned()), toml::Value::Boolean),
        Kind::List => toml::Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| toml::Value::String(s.to_owned()))
                .collect(),
        ),
        Kind::Str => toml::Value::String(raw.to_owned()),
    }
}

/// Set a dotted path, creating intermediate tables.
fn set_path(root: &mut toml::Value, path: &str, value: toml::Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(leaf) = segments.pop() else {
        return;
    };
    let mut current = root;
    for segment in segments {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        current = table
            .entry(segment)
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }
    if let Some(table) = current.as_table_mut() {
        table.insert(leaf.to_owned(), value);
    }
}

/// Replace `${VAR}` in every string of the tree.
///
/// Unknown variables and unterminated references are left as written.
pub fn resolve_env_references<S: BuildHasher>(val: &mut toml::Value, env: &HashMap<String, String, S>) {
    match val {
        toml::Value::String(s) => {
            if s.contains("${") {
                *s = substitute(s, env);
            }
        },
        toml::Value::Table(table) => {
            for (_, child) in table.iter_mut() {
                resolve_env_references(child, env);
            }
        },
        toml::Value::Array(items) => {
            for child in items {
                resolve_env_references(child, env);
            }
        },
        _ => {},
    }
}

fn substitute<S: BuildHasher>(input: &str, env: &HashMap<String, String, S>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start..];
        match after.find('}') {
            Some(end) => {
                let name = &after[2..end];
                match env.get(name) {
                    Some(value) if !name.is_empty() => out.push_str(value),
                    _ => {
                        debug!(var = name, "Unresolved environment reference in config");
                        out.push_str(&after[..=end]);
                    },
                }
                rest = &after[end.saturating_add(1)..];
            },
            None => {
                out.push_str(after);
                rest = "";
            },
        }
    }
    out.push_str(rest);
    out
}

/// Snapshot of the process environment.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}
