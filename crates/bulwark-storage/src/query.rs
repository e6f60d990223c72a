//! Query model: filters, ordering, pagination and identifier ranges.
//!
//! Comparison follows SQL habits where they are cheap to honour: equality
//! against `null` matches missing fields, inequality and range filters never
//! match a missing or `null` field, and range filters only compare values of
//! the same kind. Across kinds the sort order is
//! `null < bool < number < string < array < object`.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{Document, Fields};

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Comparison applied by a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    /// `=`
    Eq,
    /// `!=` / `<>`
    NotEq,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `LIKE` with `%` and `_` wildcards, ASCII case-insensitive.
    Like,
    /// `IS`, null-safe equality.
    Is,
}

/// A single field predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Field name.
    pub field: String,
    /// Comparison.
    pub op: FilterOp,
    /// Right-hand operand.
    pub value: Value,
}

impl Filter {
    /// Create a filter.
    #[must_use]
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Whether a document's fields satisfy this filter.
    #[must_use]
    pub fn matches(&self, fields: &Fields) -> bool {
        let actual = fields.get(&self.field);
        match self.op {
            FilterOp::Eq | FilterOp::Is => {
                values_equal(actual.unwrap_or(&Value::Null), &self.value)
            },
            FilterOp::NotEq => match actual {
                None | Some(Value::Null) => false,
                Some(v) => !self.value.is_null() && !values_equal(v, &self.value),
            },
            FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
                let Some(v) = actual else { return false };
                if v.is_null() || self.value.is_null() || kind_rank(v) != kind_rank(&self.value) {
                    return false;
                }
                let ord = compare_values(v, &self.value);
                match self.op {
                    FilterOp::Gt => ord == Ordering::Greater,
                    FilterOp::Gte => ord != Ordering::Less,
                    FilterOp::Lt => ord == Ordering::Less,
                    _ => ord != Ordering::Greater,
                }
            },
            FilterOp::Like => {
                let (Some(text), Value::String(pattern)) = (actual.and_then(like_text), &self.value)
                else {
                    return false;
                };
                like_matches(pattern, &text)
            },
        }
    }
}

fn like_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Equality that treats `1` and `1.0` as the same number.
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y) == Some(Ordering::Equal),
            _ => x == y,
        },
        _ => a == b,
    }
}

fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values used for sorting and range filters.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            a.to_string().cmp(&b.to_string())
        },
        _ => kind_rank(a).cmp(&kind_rank(b)),
    }
}

/// SQL `LIKE` matching: `%` spans any run, `_` matches one character, ASCII
/// letters compare case-insensitively.
#[must_use]
#[allow(clippy::arithmetic_side_effects)] // indices stay within the pattern and text lengths
pub fn like_matches(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;

    while let Some(&tc) = t.get(ti) {
        match p.get(pi) {
            Some('%') => {
                backtrack = Some((pi, ti));
                pi += 1;
            },
            Some(&pc) if pc == '_' || pc.eq_ignore_ascii_case(&tc) => {
                pi += 1;
                ti += 1;
            },
            _ => match backtrack {
                Some((star, from)) => {
                    pi = star + 1;
                    ti = from + 1;
                    backtrack = Some((star, from + 1));
                },
                None => return false,
            },
        }
    }
    p.iter().skip(pi).all(|&c| c == '%')
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Smallest first.
    #[default]
    Asc,
    /// Largest first.
    Desc,
}

/// Sort key for a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    /// Field to sort by. Missing fields sort as `null`.
    pub field: String,
    /// Direction.
    pub direction: Direction,
}

impl OrderBy {
    /// Ascending order on `field`.
    #[must_use]
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    /// Descending order on `field`.
    #[must_use]
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }

    /// Compare two documents under this ordering, breaking ties by identifier.
    #[must_use]
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        let av = a.fields.get(&self.field).unwrap_or(&Value::Null);
        let bv = b.fields.get(&self.field).unwrap_or(&Value::Null);
        let ord = compare_values(av, bv).then_with(|| a.id.cmp(&b.id));
        match self.direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        }
    }
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// A query over one collection.
///
/// Evaluation order is: identifier range, filters, ordering (by identifier
/// when no [`OrderBy`] is set), offset, limit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Query {
    /// Collection to read.
    pub collection: String,
    /// Conjunctive predicates.
    pub filters: Vec<Filter>,
    /// Sort key.
    pub order_by: Option<OrderBy>,
    /// Rows to skip after sorting.
    pub offset: usize,
    /// Maximum rows to return.
    pub limit: Option<usize>,
    /// Inclusive lower identifier bound.
    pub id_start: Option<String>,
    /// Exclusive upper identifier bound.
    pub id_end: Option<String>,
    /// Exclusive lower identifier bound, for cursor pagination.
    pub start_after: Option<String>,
}

impl Query {
    /// Start a query over `collection`.
    #[must_use]
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Self::default()
        }
    }

    /// Add a filter.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Add an equality filter.
    #[must_use]
    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::new(field, FilterOp::Eq, value))
    }

    /// Set the sort key.
    #[must_use]
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by = Some(order);
        self
    }

    /// Skip `offset` rows.
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Return at most `limit` rows.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Restrict identifiers to `[start, end)`. `None` leaves a side open.
    #[must_use]
    pub fn id_range(mut self, start: Option<String>, end: Option<String>) -> Self {
        self.id_start = start;
        self.id_end = end;
        self
    }

    /// Only return identifiers strictly greater than `cursor`.
    #[must_use]
    pub fn start_after(mut self, cursor: impl Into<String>) -> Self {
        self.start_after = Some(cursor.into());
        self
    }

    /// Whether an identifier falls inside the query's identifier bounds.
    #[must_use]
    pub fn id_in_range(&self, id: &str) -> bool {
        self.id_start.as_deref().is_none_or(|s| id >= s)
            && self.id_end.as_deref().is_none_or(|e| id < e)
            && self.start_after.as_deref().is_none_or(|a| id > a)
    }

    /// Whether a document satisfies the identifier bounds and every filter.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        self.id_in_range(&doc.id) && self.filters.iter().all(|f| f.matches(&doc.fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_eq_null_matches_missing_field() {
        let f = Filter::new("email", FilterOp::Eq, Value::Null);
        assert!(f.matches(&fields(json!({"name": "a"}))));
        assert!(f.matches(&fields(json!({"email": null}))));
        assert!(!f.matches(&fields(json!({"email": "x"}))));
    }

    #[test]
    fn test_not_eq_skips_missing_and_null() {
        let f = Filter::new("status", FilterOp::NotEq, "active");
        assert!(f.matches(&fields(json!({"status": "banned"}))));
        assert!(!f.matches(&fields(json!({"status": "active"}))));
        assert!(!f.matches(&fields(json!({}))));
        assert!(!f.matches(&fields(json!({"status": null}))));
    }

    #[test]
    fn test_range_filters_compare_same_kind_only() {
        let f = Filter::new("age", FilterOp::Gte, 18);
        assert!(f.matches(&fields(json!({"age": 18}))));
        assert!(f.matches(&fields(json!({"age": 40.5}))));
        assert!(!f.matches(&fields(json!({"age": 17}))));
        assert!(!f.matches(&fields(json!({"age": "99"}))));
        assert!(!f.matches(&fields(json!({}))));
    }

    #[test]
    fn test_numbers_compare_across_representations() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(!values_equal(&json!(1), &json!("1")));
    }

    #[test]
    fn test_like_matching() {
        assert!(like_matches("%@example.com", "bob@example.com"));
        assert!(like_matches("a_c", "abc"));
        assert!(like_matches("ABC%", "abcdef"));
        assert!(!like_matches("a_c", "abbc"));
        assert!(like_matches("%b%d%", "abcde"));
        assert!(like_matches("%", ""));
        assert!(!like_matches("_", ""));
    }

    #[test]
    fn test_cross_kind_ordering() {
        let mut values = vec![json!("a"), json!(3), json!(null), json!(true)];
        values.sort_by(compare_values);
        assert_eq!(values, vec![json!(null), json!(true), json!(3), json!("a")]);
    }

    #[test]
    fn test_id_bounds() {
        let q = Query::new("c")
            .id_range(Some("b".into()), Some("d".into()))
            .start_after("b");
        assert!(!q.id_in_range("a"));
        assert!(!q.id_in_range("b"));
        assert!(q.id_in_range("c"));
        assert!(!q.id_in_range("d"));
    }
}
