//! Configuration schema.
//!
//! Every section derives `Default` with the same values as `defaults.toml`,
//! and every field is `#[serde(default)]`, so a partial file deserializes.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log output.
    pub logging: LoggingSection,
    /// HTTP boundary.
    pub gateway: GatewaySection,
    /// Document store and KV.
    pub storage: StorageSection,
    /// Rate limiter defaults.
    pub rate_limits: RateLimitSection,
    /// Daily quotas.
    pub quota: QuotaSection,
    /// Primary relational store.
    pub primary: PrimarySection,
    /// Write failover.
    pub failover: FailoverSection,
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct LoggingSection {
    /// Base level filter.
    pub level: String,
    /// `pretty`, `compact`, `json` or `full`.
    pub format: String,
    /// `stdout`, `stderr` or `file`.
    pub target: String,
    /// Log directory when `target = "file"`.
    pub directory: PathBuf,
    /// Log file prefix when `target = "file"`.
    pub file_prefix: String,
    /// Per-target directives.
    pub directives: Vec<String>,
    /// Prefix lines with timestamps.
    pub timestamps: bool,
    /// Colorize terminal output.
    pub ansi: bool,
    /// Record source locations.
    pub file_info: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            target: "stderr".to_owned(),
            directory: PathBuf::from("logs"),
            file_prefix: "bulwark".to_owned(),
            directives: Vec::new(),
            timestamps: true,
            ansi: true,
            file_info: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// `[gateway]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    /// Listen address.
    pub bind: String,
    /// Largest accepted request body in bytes.
    pub request_body_limit: usize,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_owned(),
            request_body_limit: 65_536,
        }
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// `[storage]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Operations per batch commit. At most 500.
    pub max_batch_size: usize,
    /// Namespace served by the KV adapter.
    pub kv_namespace: String,
    /// Compiled statements cached per database.
    pub statement_cache_capacity: usize,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            max_batch_size: 500,
            kv_namespace: "default".to_owned(),
            statement_cache_capacity: 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// Rate limits
// ---------------------------------------------------------------------------

/// `[rate_limits]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    /// Refill rate used when a request plan omits `limitPerMinute`.
    pub default_limit_per_minute: u32,
    /// Bucket capacity used when a request plan omits `burst`.
    pub default_burst: u32,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            default_limit_per_minute: 60,
            default_burst: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Quota
// ---------------------------------------------------------------------------

/// One `[quota.plans.<tier>]` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSection {
    /// Per-principal daily limit.
    pub daily_limit: u64,
    /// Global usage above which the tier is refused.
    pub global_threshold: u64,
}

/// `[quota]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaSection {
    /// Hard ceiling across all tiers per UTC day.
    pub global_ceiling: u64,
    /// Distinct session hashes kept per day.
    pub max_sessions: usize,
    /// Principals listed by the summary.
    pub top_principals: usize,
    /// Tiers by name.
    pub plans: BTreeMap<String, PlanSection>,
}

impl Default for QuotaSection {
    fn default() -> Self {
        let plan = |daily_limit, global_threshold| PlanSection {
            daily_limit,
            global_threshold,
        };
        Self {
            global_ceiling: 50_000,
            max_sessions: 10_000,
            top_principals: 10,
            plans: BTreeMap::from([
                ("free".to_owned(), plan(50, 5_000)),
                ("pro".to_owned(), plan(1_000, 20_000)),
                ("enterprise".to_owned(), plan(10_000, 45_000)),
            ]),
        }
    }
}

// ---------------------------------------------------------------------------
// Primary
// ---------------------------------------------------------------------------

/// `[primary]`
///
/// The token is never printed by `Debug` and never serialized.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PrimarySection {
    /// Query endpoint. Unset means no primary; writes go to the fallback.
    pub endpoint: Option<String>,
    /// Bearer token.
    pub api_token: Option<String>,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for PrimarySection {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_token: None,
            timeout_secs: 10,
        }
    }
}

impl std::fmt::Debug for PrimarySection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimarySection")
            .field("endpoint", &self.endpoint)
            .field("has_api_token", &self.api_token.is_some())
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Serialize for PrimarySection {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("PrimarySection", 2)?;
        state.serialize_field("endpoint", &self.endpoint)?;
        state.serialize_field("timeout_secs", &self.timeout_secs)?;
        state.end()
    }
}

// ---------------------------------------------------------------------------
// Failover
// ---------------------------------------------------------------------------

/// `[failover]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailoverSection {
    /// Whether limit errors from the primary trip failover.
    pub enabled: bool,
    /// Case-insensitive substrings that mark a primary error as a limit error.
    pub limit_markers: Vec<String>,
}

impl Default for FailoverSection {
    fn default() -> Self {
        Self {
            enabled: true,
            limit_markers: ["rate limit", "too many requests", "limit exceeded", "quota"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
        }
    }
}
