//! Write operations and their outcomes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One parameterized write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteOperation {
    /// SQL text with `?` placeholders.
    pub sql: String,
    /// Positional parameters.
    #[serde(default)]
    pub params: Vec<Value>,
}

impl WriteOperation {
    /// Create an operation.
    #[must_use]
    pub fn new<I, V>(sql: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            sql: sql.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }
}

/// Which store accepted a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// The primary relational store.
    Primary,
    /// The document store.
    Fallback,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// A write the primary acknowledged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrimaryResponse {
    /// Rows changed.
    pub changes: u64,
    /// Identifier of an inserted row, if reported.
    pub last_row_id: Option<String>,
}

/// Result of a routed write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOutcome {
    /// Store that handled the write.
    pub backend: Backend,
    /// Rows changed.
    pub changes: u64,
    /// Identifier of an inserted row, if any.
    pub last_row_id: Option<String>,
    /// The fallback already held the row, so nothing was written.
    pub duplicate: bool,
}
