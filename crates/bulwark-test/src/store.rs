//! Failure injection for document stores.
//!
//! [`FailingDocumentStore`] delegates to an inner store and fails chosen
//! [`commit`](DocumentStore::commit) calls, or every call once
//! [`set_unavailable`](FailingDocumentStore::set_unavailable) is on. Commits
//! are numbered from 1 in the order they arrive.
//!
//! It can also lose conditional writes to a simulated concurrent writer:
//! with [`compete_on_writes`](FailingDocumentStore::compete_on_writes) set,
//! the target document is rewritten just before the next
//! [`put_if_version`](DocumentStore::put_if_version) lands, so the expected
//! version no longer matches.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bulwark_storage::{
    BatchOp, Document, DocumentStore, Fields, MemoryDocumentStore, Query, StorageError,
    StorageResult,
};

/// Edit applied to a document by the simulated concurrent writer.
pub type CompetingWrite = Arc<dyn Fn(&mut Fields) + Send + Sync>;

/// A [`DocumentStore`] wrapper that fails on demand.
pub struct FailingDocumentStore {
    inner: Arc<dyn DocumentStore>,
    failing_commits: Mutex<BTreeSet<usize>>,
    commits: AtomicUsize,
    failing_creates: AtomicUsize,
    competing: Mutex<Option<(usize, CompetingWrite)>>,
    unavailable: AtomicBool,
}

impl std::fmt::Debug for FailingDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailingDocumentStore")
            .field("commits", &self.commit_count())
            .field("failing_creates", &self.failing_creates.load(Ordering::SeqCst))
            .field("unavailable", &self.unavailable.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl FailingDocumentStore {
    /// Wrap `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn DocumentStore>) -> Self {
        Self {
            inner,
            failing_commits: Mutex::new(BTreeSet::new()),
            commits: AtomicUsize::new(0),
            failing_creates: AtomicUsize::new(0),
            competing: Mutex::new(None),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Wrap a fresh in-memory store that accepts at most `max_batch_size`
    /// operations per commit.
    #[must_use]
    pub fn in_memory(max_batch_size: usize) -> Self {
        Self::new(Arc::new(
            MemoryDocumentStore::new().with_max_batch_size(max_batch_size),
        ))
    }

    /// Fail the `n`th commit (1-based).
    #[must_use]
    pub fn fail_commit(self, n: usize) -> Self {
        self.failing_commits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(n);
        self
    }

    /// Fail the next `n` [`create`](DocumentStore::create) calls.
    #[must_use]
    pub fn fail_creates(self, n: usize) -> Self {
        self.failing_creates.store(n, Ordering::SeqCst);
        self
    }

    /// Lose the next `n` conditional writes to a concurrent writer that
    /// applies `edit` to the stored document first. A conditional write to a
    /// missing document is refused without writing anything.
    #[must_use]
    pub fn compete_on_writes(
        self,
        n: usize,
        edit: impl Fn(&mut Fields) + Send + Sync + 'static,
    ) -> Self {
        *self.competing.lock().unwrap_or_else(PoisonError::into_inner) =
            Some((n, Arc::new(edit)));
        self
    }

    /// Fail every call while `unavailable` is set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Commits attempted so far, failed ones included.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// The wrapped store.
    #[must_use]
    pub fn inner(&self) -> Arc<dyn DocumentStore> {
        Arc::clone(&self.inner)
    }

    fn next_competitor(&self) -> Option<CompetingWrite> {
        let mut competing = self.competing.lock().unwrap_or_else(PoisonError::into_inner);
        match competing.as_mut() {
            Some((remaining, edit)) if *remaining > 0 => {
                *remaining = remaining.saturating_sub(1);
                Some(Arc::clone(edit))
            },
            _ => None,
        }
    }

    fn check(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("store unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FailingDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        self.check()?;
        self.inner.get(collection, id).await
    }

    async fn query(&self, query: &Query) -> StorageResult<Vec<Document>> {
        self.check()?;
        self.inner.query(query).await
    }

    async fn count(&self, query: &Query) -> StorageResult<u64> {
        self.check()?;
        self.inner.count(query).await
    }

    async fn create(
        &self,
        collection: &str,
        id: Option<&str>,
        fields: Fields,
    ) -> StorageResult<Document> {
        self.check()?;
        let fail = self
            .failing_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            tracing::debug!(collection, ?id, "Injected create failure");
            return Err(StorageError::Internal("injected failure on create".into()));
        }
        self.inner.create(collection, id, fields).await
    }

    async fn put(&self, collection: &str, id: &str, fields: Fields) -> StorageResult<Document> {
        self.check()?;
        self.inner.put(collection, id, fields).await
    }

    async fn put_if_version(
        &self,
        collection: &str,
        id: &str,
        expected: Option<u64>,
        fields: Fields,
    ) -> StorageResult<bool> {
        self.check()?;
        if let Some(edit) = self.next_competitor() {
            let Some(mut current) = self.inner.get(collection, id).await? else {
                tracing::debug!(collection, id, "Injected conflict on missing document");
                return Ok(false);
            };
            edit(&mut current.fields);
            self.inner.put(collection, id, current.fields).await?;
            tracing::debug!(collection, id, "Injected concurrent write");
        }
        self.inner.put_if_version(collection, id, expected, fields).await
    }

    async fn delete(&self, collection: &str, id: &str) -> StorageResult<bool> {
        self.check()?;
        self.inner.delete(collection, id).await
    }

    async fn delete_if_version(
        &self,
        collection: &str,
        id: &str,
        expected: u64,
    ) -> StorageResult<bool> {
        self.check()?;
        self.inner.delete_if_version(collection, id, expected).await
    }

    async fn commit(&self, collection: &str, ops: Vec<BatchOp>) -> StorageResult<u64> {
        self.check()?;
        let n = self
            .commits
            .fetch_add(1, Ordering::SeqCst)
            .saturating_add(1);
        let fail = self
            .failing_commits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&n);
        if fail {
            tracing::debug!(collection, commit = n, "Injected commit failure");
            return Err(StorageError::Internal(format!("injected failure on commit {n}")));
        }
        self.inner.commit(collection, ops).await
    }

    fn max_batch_size(&self) -> usize {
        self.inner.max_batch_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    fn fields(value: serde_json::Value) -> Fields {
        match value {
            serde_json::Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[tokio::test]
    async fn test_fails_selected_commit_only() {
        let store = FailingDocumentStore::in_memory(10).fail_commit(2);
        for id in ["a", "b", "c"] {
            store.put("t", id, fields(json!({ "n": 0 }))).await.unwrap();
        }
        let op = |id: &str| BatchOp::Update {
            id: id.to_string(),
            fields: fields(json!({ "n": 1 })),
        };

        assert_eq!(store.commit("t", vec![op("a")]).await.unwrap(), 1);
        assert!(store.commit("t", vec![op("b")]).await.is_err());
        assert_eq!(store.commit("t", vec![op("c")]).await.unwrap(), 1);
        assert_eq!(store.commit_count(), 3);
        let b = store.get("t", "b").await.unwrap().unwrap();
        assert_eq!(b.field("n"), Some(&json!(0)));
        assert_eq!(store.max_batch_size(), 10);
    }

    #[tokio::test]
    async fn test_competing_write_wins_then_stops() {
        let store = FailingDocumentStore::in_memory(10).compete_on_writes(1, |f| {
            f.insert("other".into(), json!(true));
        });
        let first = store.put("t", "a", fields(json!({ "n": 0 }))).await.unwrap();

        let lost = store
            .put_if_version("t", "a", Some(first.version), fields(json!({ "n": 1 })))
            .await
            .unwrap();
        assert!(!lost);
        let current = store.get("t", "a").await.unwrap().unwrap();
        assert_eq!(current.field("n"), Some(&json!(0)));
        assert_eq!(current.field("other"), Some(&json!(true)));

        assert!(
            store
                .put_if_version("t", "a", Some(current.version), fields(json!({ "n": 1 })))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_competing_write_refuses_missing_document() {
        let store = FailingDocumentStore::in_memory(10).compete_on_writes(1, |_| {});
        assert!(!store.put_if_version("t", "a", None, fields(json!({}))).await.unwrap());
        assert!(store.get("t", "a").await.unwrap().is_none());
        assert!(store.put_if_version("t", "a", None, fields(json!({}))).await.unwrap());
    }

    #[tokio::test]
    async fn test_fails_next_creates() {
        let store = FailingDocumentStore::in_memory(10).fail_creates(1);
        assert!(matches!(
            store.create("t", Some("a"), fields(json!({}))).await,
            Err(StorageError::Internal(_))
        ));
        assert!(store.create("t", Some("a"), fields(json!({}))).await.is_ok());
    }

    #[tokio::test]
    async fn test_unavailable_fails_everything() {
        let store = FailingDocumentStore::in_memory(10);
        store.put("t", "a", fields(json!({}))).await.unwrap();
        store.set_unavailable(true);
        assert!(matches!(
            store.get("t", "a").await,
            Err(StorageError::Connection(_))
        ));
        store.set_unavailable(false);
        assert!(store.get("t", "a").await.unwrap().is_some());
    }
}
