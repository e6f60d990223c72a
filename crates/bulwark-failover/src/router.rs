//! Routes writes to the primary, falling back to the document store.
//!
//! A limit error from the primary trips the shared [`FailoverState`] and the
//! same write is replayed against the fallback [`Database`]. From then on
//! every write goes straight to the fallback; the flag never clears itself.
//!
//! Replays can reach the fallback more than once (a caller retrying after a
//! timeout, say). An `INSERT` whose row is already there is therefore
//! reported as a successful no-op instead of an error.

use std::sync::Arc;

use bulwark_core::{SharedClock, SystemClock};
use bulwark_sql::Database;

use crate::error::{FailoverError, FailoverResult};
use crate::operation::{Backend, WriteOperation, WriteOutcome};
use crate::primary::PrimaryStore;
use crate::state::FailoverState;

/// Primary-first write router.
#[derive(Clone)]
pub struct FailoverRouter {
    primary: Option<Arc<dyn PrimaryStore>>,
    fallback: Database,
    state: Arc<FailoverState>,
    enabled: bool,
    clock: SharedClock,
}

impl std::fmt::Debug for FailoverRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverRouter")
            .field("primary", &self.primary.as_ref().map(|p| p.name().to_string()))
            .field("tripped", &self.state.is_tripped())
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl FailoverRouter {
    /// Create a router. With no primary every write goes to the fallback.
    #[must_use]
    pub fn new(
        primary: Option<Arc<dyn PrimaryStore>>,
        fallback: Database,
        state: Arc<FailoverState>,
    ) -> Self {
        Self {
            primary,
            fallback,
            state,
            enabled: true,
            clock: SystemClock::shared(),
        }
    }

    /// Enable or disable tripping. When disabled, limit errors are returned
    /// to the caller like any other primary error.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Use a specific clock for trip timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// The shared failover flag.
    #[must_use]
    pub fn state(&self) -> &Arc<FailoverState> {
        &self.state
    }

    /// The fallback database.
    #[must_use]
    pub fn fallback(&self) -> &Database {
        &self.fallback
    }

    /// Route one write.
    ///
    /// # Errors
    ///
    /// Returns [`FailoverError::Primary`] for non-limit primary failures (and
    /// for limit failures when tripping is disabled), and
    /// [`FailoverError::Fallback`] when the document store write fails for a
    /// reason other than a duplicate id.
    pub async fn write(&self, operation: &WriteOperation) -> FailoverResult<WriteOutcome> {
        let Some(primary) = self.primary.as_ref().filter(|_| !self.state.is_tripped()) else {
            return self.write_fallback(operation).await;
        };

        match primary.execute(operation).await {
            Ok(response) => Ok(WriteOutcome {
                backend: Backend::Primary,
                changes: response.changes,
                last_row_id: response.last_row_id,
                duplicate: false,
            }),
            Err(e) if e.is_limit() && self.enabled => {
                if self.state.trip(e.to_string(), self.clock.now()) {
                    tracing::warn!(
                        primary = primary.name(),
                        error = %e,
                        "Primary limit reached, failing over to document store"
                    );
                }
                self.write_fallback(operation).await
            },
            Err(e) => Err(FailoverError::Primary(e)),
        }
    }

    /// Route writes one after another. Every write is attempted; outcomes
    /// are reported in position.
    pub async fn write_all(&self, operations: &[WriteOperation]) -> Vec<FailoverResult<WriteOutcome>> {
        let mut outcomes = Vec::with_capacity(operations.len());
        for operation in operations {
            outcomes.push(self.write(operation).await);
        }
        outcomes
    }

    async fn write_fallback(&self, operation: &WriteOperation) -> FailoverResult<WriteOutcome> {
        let result = self
            .fallback
            .prepare(&operation.sql)
            .bind(operation.params.iter().cloned())
            .run()
            .await;
        match result {
            Ok(result) => Ok(WriteOutcome {
                backend: Backend::Fallback,
                changes: result.meta.changes,
                last_row_id: result.meta.last_row_id,
                duplicate: false,
            }),
            Err(e) if e.is_already_exists() => {
                tracing::debug!(sql = %operation.sql, "Row already present on fallback, skipping");
                Ok(WriteOutcome {
                    backend: Backend::Fallback,
                    changes: 0,
                    last_row_id: None,
                    duplicate: true,
                })
            },
            Err(e) => Err(FailoverError::Fallback(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PrimaryError;
    use crate::operation::PrimaryResponse;
    use async_trait::async_trait;
    use bulwark_storage::MemoryDocumentStore;
    use serde_json::json;
    use std::sync::Mutex;

    /// Replies from a fixed list, then succeeds.
    struct Scripted {
        replies: Mutex<Vec<Result<PrimaryResponse, PrimaryError>>>,
        calls: Mutex<usize>,
    }

    impl Scripted {
        fn new(mut replies: Vec<Result<PrimaryResponse, PrimaryError>>) -> Arc<Self> {
            replies.reverse();
            Arc::new(Self {
                replies: Mutex::new(replies),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl PrimaryStore for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn execute(&self, _: &WriteOperation) -> Result<PrimaryResponse, PrimaryError> {
            *self.calls.lock().unwrap() += 1;
            self.replies.lock().unwrap().pop().unwrap_or(Ok(PrimaryResponse {
                changes: 1,
                last_row_id: None,
            }))
        }
    }

    fn limited() -> Result<PrimaryResponse, PrimaryError> {
        Err(PrimaryError::Limited {
            status: 429,
            message: "too many requests".into(),
        })
    }

    fn insert(id: &str) -> WriteOperation {
        WriteOperation::new("INSERT INTO events (id, kind) VALUES (?, ?)", [json!(id), json!("click")])
    }

    fn router(primary: Arc<Scripted>) -> FailoverRouter {
        FailoverRouter::new(
            Some(primary),
            Database::new(Arc::new(MemoryDocumentStore::new())),
            Arc::new(FailoverState::new()),
        )
    }

    #[tokio::test]
    async fn test_primary_success() {
        let primary = Scripted::new(vec![]);
        let router = router(Arc::clone(&primary));
        let outcome = router.write(&insert("e1")).await.unwrap();
        assert_eq!(outcome.backend, Backend::Primary);
        assert!(!router.state().is_tripped());
    }

    #[tokio::test]
    async fn test_limit_trips_and_sticks() {
        let primary = Scripted::new(vec![limited()]);
        let router = router(Arc::clone(&primary));

        let first = router.write(&insert("e1")).await.unwrap();
        assert_eq!(first.backend, Backend::Fallback);
        assert_eq!(first.changes, 1);
        assert!(router.state().is_tripped());

        let second = router.write(&insert("e2")).await.unwrap();
        assert_eq!(second.backend, Backend::Fallback);
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test]
    async fn test_replayed_insert_is_noop() {
        let router = router(Scripted::new(vec![limited()]));
        router.write(&insert("e1")).await.unwrap();
        let replay = router.write(&insert("e1")).await.unwrap();
        assert!(replay.duplicate);
        assert_eq!(replay.changes, 0);

        let count = router
            .fallback()
            .exec("SELECT COUNT(*) FROM events")
            .await
            .unwrap();
        assert_eq!(count.results[0]["COUNT(*)"], json!(1));
    }

    #[tokio::test]
    async fn test_other_primary_errors_propagate() {
        let primary = Scripted::new(vec![Err(PrimaryError::Api {
            status: 400,
            message: "syntax error".into(),
        })]);
        let router = router(primary);
        assert!(matches!(
            router.write(&insert("e1")).await,
            Err(FailoverError::Primary(PrimaryError::Api { .. }))
        ));
        assert!(!router.state().is_tripped());
    }

    #[tokio::test]
    async fn test_disabled_never_trips() {
        let router = router(Scripted::new(vec![limited()])).with_enabled(false);
        assert!(router.write(&insert("e1")).await.is_err());
        assert!(!router.state().is_tripped());
    }

    #[tokio::test]
    async fn test_no_primary_writes_fallback() {
        let router = FailoverRouter::new(
            None,
            Database::new(Arc::new(MemoryDocumentStore::new())),
            Arc::new(FailoverState::new()),
        );
        let outcomes = router.write_all(&[insert("a"), insert("b"), insert("a")]).await;
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| o.as_ref().is_ok_and(|w| w.backend == Backend::Fallback)));
        assert!(outcomes[2].as_ref().unwrap().duplicate);
    }

    #[tokio::test]
    async fn test_state_shared_between_routers() {
        let state = Arc::new(FailoverState::new());
        let db = Database::new(Arc::new(MemoryDocumentStore::new()));
        let a = FailoverRouter::new(Some(Scripted::new(vec![limited()])), db.clone(), Arc::clone(&state));
        let b_primary = Scripted::new(vec![]);
        let b = FailoverRouter::new(Some(b_primary.clone()), db, state);

        a.write(&insert("x")).await.unwrap();
        let outcome = b.write(&insert("y")).await.unwrap();
        assert_eq!(outcome.backend, Backend::Fallback);
        assert_eq!(b_primary.calls(), 0);
    }
}
