//! Compiled statement descriptors.

use bulwark_storage::{FilterOp, OrderBy};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Statement kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    /// `SELECT cols FROM ...`
    #[default]
    Select,
    /// `INSERT INTO ... VALUES ...`
    Insert,
    /// `UPDATE ... SET ...`
    Update,
    /// `DELETE FROM ...`
    Delete,
    /// `SELECT COUNT(*) FROM ...`
    Count,
}

impl Operation {
    /// Whether the operation writes.
    #[must_use]
    pub const fn is_mutation(self) -> bool {
        matches!(self, Self::Insert | Self::Update | Self::Delete)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Count => "COUNT",
        };
        f.write_str(name)
    }
}

/// Where a value comes from at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    /// Bound parameter at this zero-based position.
    Param(usize),
    /// Literal written in the statement.
    Literal(Value),
}

impl Operand {
    /// Parameter position, if this operand is a placeholder.
    #[must_use]
    pub const fn param_index(&self) -> Option<usize> {
        match self {
            Self::Param(index) => Some(*index),
            Self::Literal(_) => None,
        }
    }

    /// Resolve against bound parameters. Missing parameters resolve to `null`.
    #[must_use]
    pub fn resolve(&self, params: &[Value]) -> Value {
        match self {
            Self::Param(index) => params.get(*index).cloned().unwrap_or(Value::Null),
            Self::Literal(value) => value.clone(),
        }
    }
}

/// One `column op operand` condition. Conditions are AND-joined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhereClause {
    /// Column name.
    pub column: String,
    /// Comparison.
    pub op: FilterOp,
    /// Right-hand side.
    pub operand: Operand,
}

impl WhereClause {
    /// Parameter position of the right-hand side, if it is a placeholder.
    #[must_use]
    pub const fn param_index(&self) -> Option<usize> {
        self.operand.param_index()
    }
}

/// Descriptor produced by [`compile`](crate::compile).
///
/// Immutable once built; shared by every execution of the same SQL string.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParsedStatement {
    /// Statement kind.
    pub op: Operation,
    /// Target table (collection).
    pub table: String,
    /// `SELECT` projection (empty for `*`) or `INSERT` column list.
    pub columns: Vec<String>,
    /// AND-joined conditions.
    pub where_clauses: Vec<WhereClause>,
    /// `ORDER BY` column and direction.
    pub order_by: Option<OrderBy>,
    /// `LIMIT` operand.
    pub limit: Option<Operand>,
    /// `OFFSET` operand.
    pub offset: Option<Operand>,
    /// `UPDATE ... SET` columns.
    pub set_columns: Vec<String>,
    /// Values parallel to `columns` (`INSERT`) or `set_columns` (`UPDATE`).
    pub values: Vec<Operand>,
    /// Result column name for `COUNT`, the alias when one was given.
    pub count_alias: Option<String>,
    /// Number of `?` placeholders in the statement.
    pub param_count: usize,
    /// Whether the whole statement was understood.
    pub complete: bool,
}

impl ParsedStatement {
    /// Whether the whole statement was understood.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.complete
    }

    /// Row key under which `COUNT` results are reported.
    #[must_use]
    pub fn count_column(&self) -> &str {
        self.count_alias.as_deref().unwrap_or("COUNT(*)")
    }

    /// Whether the projection selects every field.
    #[must_use]
    pub fn selects_all(&self) -> bool {
        self.columns.is_empty()
    }
}
