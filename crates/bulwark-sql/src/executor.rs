//! Runs compiled statements against a [`DocumentStore`].
//!
//! Each table is a collection and each row a document. Results are shaped
//! like relational rows: flat maps of column to value, without the store's
//! bookkeeping.

use bulwark_storage::{BatchOp, Document, DocumentStore, Fields, Filter, Query};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{SqlError, SqlResult};
use crate::parsed::{Operand, Operation, ParsedStatement};

/// A result row.
pub type Row = Map<String, Value>;

/// Execution metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMeta {
    /// Documents created, updated or deleted.
    pub changes: u64,
    /// Identifier of the document an `INSERT` created.
    pub last_row_id: Option<String>,
    /// Wall time spent executing, in milliseconds.
    pub duration_ms: f64,
}

/// Outcome of running a statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Rows returned (empty for writes).
    pub results: Vec<Row>,
    /// Always `true`; failures surface as errors.
    pub success: bool,
    /// Execution metadata.
    pub meta: QueryMeta,
}

impl QueryResult {
    fn rows(results: Vec<Row>) -> Self {
        Self {
            results,
            success: true,
            meta: QueryMeta::default(),
        }
    }

    fn changes(changes: u64, last_row_id: Option<String>) -> Self {
        Self {
            results: Vec::new(),
            success: true,
            meta: QueryMeta {
                changes,
                last_row_id,
                duration_ms: 0.0,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub(crate) struct Executor<'a> {
    pub(crate) store: &'a dyn DocumentStore,
    pub(crate) max_batch_size: usize,
}

impl Executor<'_> {
    pub(crate) async fn execute(
        &self,
        sql: &str,
        stmt: &ParsedStatement,
        params: &[Value],
    ) -> SqlResult<QueryResult> {
        if stmt.table.is_empty() {
            return Err(SqlError::MissingTable(sql.to_string()));
        }
        if stmt.op.is_mutation() && stmt.op != Operation::Insert && !stmt.is_complete() {
            return Err(SqlError::IncompleteMutation {
                op: stmt.op.to_string(),
                sql: sql.to_string(),
            });
        }

        match stmt.op {
            Operation::Select => self.select(stmt, params).await,
            Operation::Count => self.count(stmt, params).await,
            Operation::Insert => self.insert(stmt, params).await,
            Operation::Update => {
                let fields: Fields = stmt
                    .set_columns
                    .iter()
                    .zip(&stmt.values)
                    .map(|(column, value)| (column.clone(), value.resolve(params)))
                    .collect();
                self.mutate(stmt, params, |doc| BatchOp::Update {
                    id: doc.id,
                    fields: fields.clone(),
                })
                .await
            },
            Operation::Delete => {
                self.mutate(stmt, params, |doc| BatchOp::Delete { id: doc.id })
                    .await
            },
        }
    }

    async fn select(&self, stmt: &ParsedStatement, params: &[Value]) -> SqlResult<QueryResult> {
        let mut query = filtered_query(stmt, params);
        query.order_by.clone_from(&stmt.order_by);
        if let Some(offset) = resolve_bound(stmt.offset.as_ref(), params)? {
            query.offset = offset;
        }
        query.limit = resolve_bound(stmt.limit.as_ref(), params)?;

        let docs = self.store.query(&query).await?;
        let rows = docs.into_iter().map(|doc| project(stmt, doc)).collect();
        Ok(QueryResult::rows(rows))
    }

    async fn count(&self, stmt: &ParsedStatement, params: &[Value]) -> SqlResult<QueryResult> {
        let n = self.store.count(&filtered_query(stmt, params)).await?;
        let mut row = Row::new();
        row.insert(stmt.count_column().to_string(), Value::from(n));
        Ok(QueryResult::rows(vec![row]))
    }

    async fn insert(&self, stmt: &ParsedStatement, params: &[Value]) -> SqlResult<QueryResult> {
        let fields: Fields = stmt
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let value = stmt
                    .values
                    .get(i)
                    .map_or(Value::Null, |operand| operand.resolve(params));
                (column.clone(), value)
            })
            .collect();
        let id = explicit_id(params.first());
        let doc = self.store.create(&stmt.table, id.as_deref(), fields).await?;
        tracing::debug!(table = %stmt.table, id = %doc.id, "Inserted row");
        Ok(QueryResult::changes(1, Some(doc.id)))
    }

    /// Resolve the target set, then commit `op_for` over it in bounded chunks.
    ///
    /// Chunks run one after another. A failed chunk does not stop later
    /// chunks and does not undo earlier ones.
    async fn mutate<F>(
        &self,
        stmt: &ParsedStatement,
        params: &[Value],
        op_for: F,
    ) -> SqlResult<QueryResult>
    where
        F: Fn(Document) -> BatchOp,
    {
        let targets = self.store.query(&filtered_query(stmt, params)).await?;
        if targets.is_empty() {
            return Ok(QueryResult::changes(0, None));
        }

        let chunk_size = self
            .max_batch_size
            .min(self.store.max_batch_size())
            .max(1);
        let mut ops = targets.into_iter().map(op_for).peekable();
        let mut committed: u64 = 0;
        let mut total_chunks: usize = 0;
        let mut failed_chunks: usize = 0;
        let mut first_error: Option<String> = None;

        while ops.peek().is_some() {
            let chunk: Vec<BatchOp> = ops.by_ref().take(chunk_size).collect();
            let size = chunk.len();
            total_chunks = total_chunks.saturating_add(1);
            match self.store.commit(&stmt.table, chunk).await {
                Ok(changed) => {
                    committed = committed.saturating_add(changed);
                    tracing::debug!(table = %stmt.table, chunk = total_chunks, size, changed, "Committed chunk");
                },
                Err(e) => {
                    failed_chunks = failed_chunks.saturating_add(1);
                    tracing::warn!(table = %stmt.table, chunk = total_chunks, size, error = %e, "Batch chunk failed");
                    first_error.get_or_insert_with(|| e.to_string());
                },
            }
        }

        if let Some(message) = first_error {
            return Err(SqlError::PartialBatch {
                committed,
                failed_chunks,
                total_chunks,
                message,
            });
        }
        Ok(QueryResult::changes(committed, None))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn filtered_query(stmt: &ParsedStatement, params: &[Value]) -> Query {
    stmt.where_clauses
        .iter()
        .fold(Query::new(stmt.table.clone()), |query, clause| {
            query.filter(Filter::new(
                clause.column.clone(),
                clause.op,
                clause.operand.resolve(params),
            ))
        })
}

/// Resolve a `LIMIT`/`OFFSET` operand. `null` and negative values mean
/// "no bound".
fn resolve_bound(operand: Option<&Operand>, params: &[Value]) -> SqlResult<Option<usize>> {
    let Some(operand) = operand else {
        return Ok(None);
    };
    let invalid = |message: String| SqlError::InvalidParameter {
        index: operand.param_index().unwrap_or_default(),
        message,
    };
    match operand.resolve(params) {
        Value::Null => Ok(None),
        Value::Number(n) => {
            if let Some(n) = n.as_u64() {
                Ok(Some(usize::try_from(n).unwrap_or(usize::MAX)))
            } else if n.as_i64().is_some() {
                Ok(None)
            } else {
                Err(invalid(format!("{n} is not an integer")))
            }
        },
        Value::String(s) => s
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| invalid(format!("{s:?} is not an integer"))),
        other => Err(invalid(format!("{other} is not an integer"))),
    }
}

/// Explicit identifier convention: the first bound value, when non-empty.
fn explicit_id(first: Option<&Value>) -> Option<String> {
    match first? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn project(stmt: &ParsedStatement, doc: Document) -> Row {
    if stmt.selects_all() {
        return doc.fields;
    }
    stmt.columns
        .iter()
        .map(|column| {
            let value = doc.fields.get(column).cloned().unwrap_or(Value::Null);
            (column.clone(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;
    use bulwark_storage::MemoryDocumentStore;
    use serde_json::json;

    async fn run(store: &MemoryDocumentStore, sql: &str, params: &[Value]) -> SqlResult<QueryResult> {
        let executor = Executor {
            store,
            max_batch_size: 2,
        };
        executor.execute(sql, &compile(sql), params).await
    }

    async fn seeded() -> MemoryDocumentStore {
        let store = MemoryDocumentStore::new();
        for (id, tier, score) in [("a", "free", 3), ("b", "pro", 9), ("c", "free", 7), ("d", "pro", 1), ("e", "free", 5)] {
            run(
                &store,
                "INSERT INTO accounts (id, tier, score) VALUES (?, ?, ?)",
                &[json!(id), json!(tier), json!(score)],
            )
            .await
            .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_insert_uses_first_param_as_id() {
        let store = MemoryDocumentStore::new();
        let result = run(
            &store,
            "INSERT INTO t (k, v) VALUES (?, ?)",
            &[json!("key-1"), json!(2)],
        )
        .await
        .unwrap();
        assert_eq!(result.meta.changes, 1);
        assert_eq!(result.meta.last_row_id.as_deref(), Some("key-1"));
    }

    #[tokio::test]
    async fn test_insert_generates_id_for_empty_first_param() {
        let store = MemoryDocumentStore::new();
        let result = run(&store, "INSERT INTO t (k) VALUES (?)", &[json!("")])
            .await
            .unwrap();
        let id = result.meta.last_row_id.unwrap();
        assert!(!id.is_empty());
    }

    #[tokio::test]
    async fn test_select_orders_then_offsets_then_limits() {
        let store = seeded().await;
        let result = run(
            &store,
            "SELECT id FROM accounts ORDER BY score DESC LIMIT ? OFFSET ?",
            &[json!(2), json!(1)],
        )
        .await
        .unwrap();
        let ids: Vec<_> = result.results.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, [json!("c"), json!("e")]);
    }

    #[tokio::test]
    async fn test_missing_params_bind_as_null() {
        let store = seeded().await;
        let result = run(&store, "SELECT * FROM accounts WHERE nickname = ?", &[])
            .await
            .unwrap();
        assert_eq!(result.results.len(), 5);
    }

    #[tokio::test]
    async fn test_projection_fills_missing_columns_with_null() {
        let store = seeded().await;
        let result = run(&store, "SELECT id, nickname FROM accounts WHERE id = ?", &[json!("a")])
            .await
            .unwrap();
        assert_eq!(result.results, [json!({"id": "a", "nickname": null}).as_object().cloned().unwrap()]);
    }

    #[tokio::test]
    async fn test_count() {
        let store = seeded().await;
        let result = run(&store, "SELECT COUNT(*) AS n FROM accounts WHERE tier = ?", &[json!("free")])
            .await
            .unwrap();
        assert_eq!(result.results[0]["n"], json!(3));
    }

    #[tokio::test]
    async fn test_update_chunks_across_batches() {
        let store = seeded().await;
        let result = run(&store, "UPDATE accounts SET tier = ? WHERE tier = ?", &[json!("gold"), json!("free")])
            .await
            .unwrap();
        assert_eq!(result.meta.changes, 3);
        let gold = run(&store, "SELECT COUNT(*) FROM accounts WHERE tier = 'gold'", &[])
            .await
            .unwrap();
        assert_eq!(gold.results[0]["COUNT(*)"], json!(3));
    }

    #[tokio::test]
    async fn test_delete_with_range_filter() {
        let store = seeded().await;
        let result = run(&store, "DELETE FROM accounts WHERE score < ?", &[json!(5)])
            .await
            .unwrap();
        assert_eq!(result.meta.changes, 2);
        assert_eq!(store.len("accounts"), 3);
    }

    #[tokio::test]
    async fn test_partial_delete_refused() {
        let store = seeded().await;
        let err = run(&store, "DELETE FROM accounts WHERE tier = ? OR score > ?", &[json!("pro"), json!(1)])
            .await
            .unwrap_err();
        assert!(matches!(err, SqlError::IncompleteMutation { .. }));
        assert_eq!(store.len("accounts"), 5);
    }

    #[tokio::test]
    async fn test_missing_table() {
        let store = MemoryDocumentStore::new();
        let err = run(&store, "VACUUM", &[]).await.unwrap_err();
        assert!(matches!(err, SqlError::MissingTable(_)));
    }

    #[tokio::test]
    async fn test_bounds_from_strings_and_negatives() {
        let store = seeded().await;
        let all = run(&store, "SELECT * FROM accounts LIMIT ?", &[json!(-1)])
            .await
            .unwrap();
        assert_eq!(all.results.len(), 5);
        let two = run(&store, "SELECT * FROM accounts LIMIT ?", &[json!("2")])
            .await
            .unwrap();
        assert_eq!(two.results.len(), 2);
        assert!(run(&store, "SELECT * FROM accounts LIMIT ?", &[json!("many")]).await.is_err());
    }
}
