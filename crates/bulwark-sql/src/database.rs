//! Prepared-statement adapter: [`Database`] and [`Statement`].

use std::sync::Arc;
use std::time::Instant;

use bulwark_storage::{DocumentStore, MAX_BATCH_OPS};
use dashmap::DashMap;
use serde_json::Value;

use crate::error::SqlResult;
use crate::executor::{Executor, QueryResult};
use crate::parsed::{Operation, ParsedStatement};
use crate::parser::compile;

/// Tuning for a [`Database`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Operations per chunk for `UPDATE`/`DELETE`. Also capped by the store.
    pub max_batch_size: usize,
    /// Compiled statements kept before the cache is flushed.
    pub statement_cache_capacity: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_batch_size: MAX_BATCH_OPS,
            statement_cache_capacity: 1024,
        }
    }
}

struct Inner {
    store: Arc<dyn DocumentStore>,
    statements: DashMap<String, Arc<ParsedStatement>>,
    config: DatabaseConfig,
}

/// SQL front-end over a document store.
///
/// Cheap to clone; clones share the store and the statement cache.
#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.inner.config)
            .field("cached_statements", &self.inner.statements.len())
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Create a database with default tuning.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_config(store, DatabaseConfig::default())
    }

    /// Create a database with explicit tuning.
    #[must_use]
    pub fn with_config(store: Arc<dyn DocumentStore>, config: DatabaseConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                statements: DashMap::new(),
                config,
            }),
        }
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> Arc<dyn DocumentStore> {
        Arc::clone(&self.inner.store)
    }

    /// Compile `sql` (or reuse a cached compilation) into an unbound statement.
    #[must_use]
    pub fn prepare(&self, sql: &str) -> Statement {
        Statement {
            db: self.clone(),
            sql: Arc::from(sql),
            parsed: self.compiled(sql),
            params: Vec::new(),
        }
    }

    /// Run a statement with no parameters.
    ///
    /// # Errors
    ///
    /// See [`Statement::run`].
    pub async fn exec(&self, sql: &str) -> SqlResult<QueryResult> {
        self.prepare(sql).run().await
    }

    /// Run statements one after another.
    ///
    /// A failing statement does not stop the ones after it; each result is
    /// reported in position.
    pub async fn batch(&self, statements: &[Statement]) -> Vec<SqlResult<QueryResult>> {
        let mut results = Vec::with_capacity(statements.len());
        for (index, statement) in statements.iter().enumerate() {
            let result = statement.run().await;
            if let Err(e) = &result {
                tracing::warn!(index, sql = statement.sql(), error = %e, "Batch statement failed");
            }
            results.push(result);
        }
        results
    }

    /// Number of compiled statements currently cached.
    #[must_use]
    pub fn cached_statements(&self) -> usize {
        self.inner.statements.len()
    }

    fn compiled(&self, sql: &str) -> Arc<ParsedStatement> {
        if let Some(parsed) = self.inner.statements.get(sql) {
            return Arc::clone(parsed.value());
        }
        let parsed = Arc::new(compile(sql));
        if self.inner.statements.len() >= self.inner.config.statement_cache_capacity {
            tracing::debug!(
                capacity = self.inner.config.statement_cache_capacity,
                "Statement cache full, flushing"
            );
            self.inner.statements.clear();
        }
        self.inner
            .statements
            .insert(sql.to_string(), Arc::clone(&parsed));
        parsed
    }

    async fn execute(
        &self,
        sql: &str,
        parsed: &ParsedStatement,
        params: &[Value],
    ) -> SqlResult<QueryResult> {
        let started = Instant::now();
        let executor = Executor {
            store: self.inner.store.as_ref(),
            max_batch_size: self.inner.config.max_batch_size,
        };
        let mut result = executor.execute(sql, parsed, params).await?;
        result.meta.duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        tracing::debug!(
            op = %parsed.op,
            table = %parsed.table,
            rows = result.results.len(),
            changes = result.meta.changes,
            duration_ms = result.meta.duration_ms,
            "Executed statement"
        );
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Statement
// ---------------------------------------------------------------------------

/// A compiled statement plus its bound parameters.
///
/// Binding replaces the parameter list and returns the statement, so one
/// prepared statement can be cloned and re-bound any number of times.
#[derive(Clone)]
pub struct Statement {
    db: Database,
    sql: Arc<str>,
    parsed: Arc<ParsedStatement>,
    params: Vec<Value>,
}

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl Statement {
    /// Bind positional parameters, replacing any previous binding.
    #[must_use]
    pub fn bind<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.params = values.into_iter().map(Into::into).collect();
        self
    }

    /// The SQL this statement was prepared from.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The compiled descriptor.
    #[must_use]
    pub fn parsed(&self) -> &ParsedStatement {
        &self.parsed
    }

    /// Currently bound parameters.
    #[must_use]
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Execute the statement.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::Storage`](crate::SqlError::Storage) when the store
    /// fails, [`SqlError::PartialBatch`](crate::SqlError::PartialBatch) when
    /// some chunks of a bulk write fail, and
    /// [`SqlError::IncompleteMutation`](crate::SqlError::IncompleteMutation)
    /// for `UPDATE`/`DELETE` statements that were only partly compiled.
    pub async fn run(&self) -> SqlResult<QueryResult> {
        self.db.execute(&self.sql, &self.parsed, &self.params).await
    }

    /// Alias of [`run`](Self::run).
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub async fn all(&self) -> SqlResult<QueryResult> {
        self.run().await
    }

    /// First row as a JSON object, or one column of it.
    ///
    /// Returns `None` when there are no rows. A named column missing from the
    /// row reads as `null`.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub async fn first(&self, column: Option<&str>) -> SqlResult<Option<Value>> {
        let result = self.run().await?;
        Ok(result.results.into_iter().next().map(|row| match column {
            Some(name) => row.get(name).cloned().unwrap_or(Value::Null),
            None => Value::Object(row),
        }))
    }

    /// Rows as arrays of values.
    ///
    /// Columns follow the `SELECT` list when one was given. `SELECT *` rows
    /// come back ordered by column name, not in insertion order.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub async fn raw(&self) -> SqlResult<Vec<Vec<Value>>> {
        let result = self.run().await?;
        let projected = self.parsed.op == Operation::Select && !self.parsed.selects_all();
        Ok(result
            .results
            .into_iter()
            .map(|row| {
                if projected {
                    self.parsed
                        .columns
                        .iter()
                        .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
                        .collect()
                } else {
                    row.into_iter().map(|(_, v)| v).collect()
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulwark_storage::MemoryDocumentStore;
    use serde_json::json;

    fn db() -> Database {
        Database::new(Arc::new(MemoryDocumentStore::new()))
    }

    #[tokio::test]
    async fn test_prepare_caches_compilations() {
        let db = db();
        let a = db.prepare("SELECT * FROM t WHERE x = ?");
        let b = db.prepare("SELECT * FROM t WHERE x = ?");
        assert!(Arc::ptr_eq(&a.parsed, &b.parsed));
        assert_eq!(db.cached_statements(), 1);
    }

    #[tokio::test]
    async fn test_rebinding_reuses_statement() {
        let db = db();
        let insert = db.prepare("INSERT INTO kv (k, v) VALUES (?, ?)");
        insert.clone().bind(["a", "1"]).run().await.unwrap();
        insert.clone().bind(["b", "2"]).run().await.unwrap();

        let lookup = db.prepare("SELECT v FROM kv WHERE k = ?");
        assert_eq!(
            lookup.clone().bind(["b"]).first(Some("v")).await.unwrap(),
            Some(json!("2"))
        );
        assert_eq!(lookup.bind(["zzz"]).first(None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_raw_follows_select_list() {
        let db = db();
        db.prepare("INSERT INTO p (id, x, y) VALUES (?, ?, ?)")
            .bind([json!("p1"), json!(1), json!(2)])
            .run()
            .await
            .unwrap();
        let raw = db.prepare("SELECT y, x FROM p").raw().await.unwrap();
        assert_eq!(raw, vec![vec![json!(2), json!(1)]]);
    }

    #[tokio::test]
    async fn test_raw_select_all_orders_columns_by_name() {
        let db = db();
        db.prepare("INSERT INTO p (id, zeta, alpha) VALUES (?, ?, ?)")
            .bind([json!("p1"), json!("z"), json!("a")])
            .run()
            .await
            .unwrap();
        let raw = db.prepare("SELECT * FROM p").raw().await.unwrap();
        let row = &raw[0];
        let alpha = row.iter().position(|v| v == &json!("a")).unwrap();
        let zeta = row.iter().position(|v| v == &json!("z")).unwrap();
        assert!(alpha < zeta);
    }

    #[tokio::test]
    async fn test_batch_continues_after_failure() {
        let db = db();
        let statements = vec![
            db.prepare("INSERT INTO t (id) VALUES (?)").bind(["x"]),
            db.prepare("INSERT INTO t (id) VALUES (?)").bind(["x"]),
            db.prepare("INSERT INTO t (id) VALUES (?)").bind(["y"]),
        ];
        let results = db.batch(&statements).await;
        assert!(results[0].is_ok());
        assert!(results[1].as_ref().unwrap_err().is_already_exists());
        assert!(results[2].is_ok());
        let count = db.exec("SELECT COUNT(*) FROM t").await.unwrap();
        assert_eq!(count.results[0]["COUNT(*)"], json!(2));
    }

    #[tokio::test]
    async fn test_cache_flushes_at_capacity() {
        let db = Database::with_config(
            Arc::new(MemoryDocumentStore::new()),
            DatabaseConfig {
                statement_cache_capacity: 2,
                ..DatabaseConfig::default()
            },
        );
        let _ = db.prepare("SELECT * FROM a");
        let _ = db.prepare("SELECT * FROM b");
        let _ = db.prepare("SELECT * FROM c");
        assert_eq!(db.cached_statements(), 1);
    }
}
