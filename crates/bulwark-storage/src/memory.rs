//! In-memory [`DocumentStore`] for tests and single-process deployments.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bulwark_core::{SharedClock, SystemClock};
use uuid::Uuid;

use crate::document::{BatchOp, Document, DocumentStore, Fields, MAX_BATCH_OPS};
use crate::error::{StorageError, StorageResult};
use crate::id::{validate_collection, validate_document_id};
use crate::query::Query;

type Collection = BTreeMap<String, Document>;

/// In-memory document store.
///
/// Collections are ordered maps keyed by identifier, so identifier-range
/// scans and the default identifier ordering come for free. All operations on
/// a single store are linearizable.
#[derive(Debug)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, Collection>>,
    clock: SharedClock,
    max_batch_size: usize,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    /// Create an empty store on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(SystemClock::shared())
    }

    /// Create an empty store that stamps documents using `clock`.
    #[must_use]
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            clock,
            max_batch_size: MAX_BATCH_OPS,
        }
    }

    /// Override the per-commit operation limit.
    #[must_use]
    pub fn with_max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = max.max(1);
        self
    }

    /// Number of documents in a collection.
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.read().get(collection).map_or(0, BTreeMap::len)
    }

    /// Whether a collection holds no documents.
    #[must_use]
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Collection>> {
        self.collections.read().unwrap_or_else(|e| {
            tracing::warn!("document store lock poisoned, recovering");
            e.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Collection>> {
        self.collections.write().unwrap_or_else(|e| {
            tracing::warn!("document store lock poisoned, recovering");
            e.into_inner()
        })
    }

    fn scan<'a>(collection: &'a Collection, query: &'a Query) -> Vec<&'a Document> {
        let lower = match (&query.id_start, &query.start_after) {
            (Some(start), Some(after)) if after.as_str() >= start.as_str() => {
                Bound::Excluded(after.as_str())
            },
            (Some(start), _) => Bound::Included(start.as_str()),
            (None, Some(after)) => Bound::Excluded(after.as_str()),
            (None, None) => Bound::Unbounded,
        };
        let upper = query
            .id_end
            .as_deref()
            .map_or(Bound::Unbounded, Bound::Excluded);
        if let (Bound::Included(lo) | Bound::Excluded(lo), Bound::Excluded(hi)) = (lower, upper)
            && lo >= hi
        {
            return Vec::new();
        }

        collection
            .range::<str, _>((lower, upper))
            .map(|(_, doc)| doc)
            .filter(|doc| query.matches(doc))
            .collect()
    }

    fn next_version(doc: &Document) -> u64 {
        doc.version.saturating_add(1)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        validate_collection(collection)?;
        validate_document_id(id)?;
        Ok(self.read().get(collection).and_then(|c| c.get(id)).cloned())
    }

    async fn query(&self, query: &Query) -> StorageResult<Vec<Document>> {
        validate_collection(&query.collection)?;
        let collections = self.read();
        let Some(collection) = collections.get(&query.collection) else {
            return Ok(Vec::new());
        };

        let mut docs = Self::scan(collection, query);
        if let Some(order) = &query.order_by {
            docs.sort_by(|a, b| order.compare(a, b));
        }
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(docs
            .into_iter()
            .skip(query.offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self, query: &Query) -> StorageResult<u64> {
        validate_collection(&query.collection)?;
        let collections = self.read();
        let matched = collections
            .get(&query.collection)
            .map_or(0, |c| Self::scan(c, query).len());
        Ok(u64::try_from(matched).unwrap_or(u64::MAX))
    }

    async fn create(
        &self,
        collection: &str,
        id: Option<&str>,
        fields: Fields,
    ) -> StorageResult<Document> {
        validate_collection(collection)?;
        let id = match id {
            Some(id) => {
                validate_document_id(id)?;
                id.to_string()
            },
            None => Uuid::new_v4().simple().to_string(),
        };

        let mut collections = self.write();
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.contains_key(&id) {
            return Err(StorageError::AlreadyExists {
                collection: collection.to_string(),
                id,
            });
        }
        let doc = Document {
            id: id.clone(),
            fields,
            created_at: self.clock.now(),
            updated_at: None,
            version: 1,
        };
        docs.insert(id, doc.clone());
        Ok(doc)
    }

    async fn put(&self, collection: &str, id: &str, fields: Fields) -> StorageResult<Document> {
        validate_collection(collection)?;
        validate_document_id(id)?;
        let now = self.clock.now();

        let mut collections = self.write();
        let docs = collections.entry(collection.to_string()).or_default();
        let doc = match docs.get(id) {
            Some(existing) => Document {
                id: id.to_string(),
                fields,
                created_at: existing.created_at,
                updated_at: Some(now),
                version: Self::next_version(existing),
            },
            None => Document {
                id: id.to_string(),
                fields,
                created_at: now,
                updated_at: None,
                version: 1,
            },
        };
        docs.insert(id.to_string(), doc.clone());
        Ok(doc)
    }

    async fn put_if_version(
        &self,
        collection: &str,
        id: &str,
        expected: Option<u64>,
        fields: Fields,
    ) -> StorageResult<bool> {
        validate_collection(collection)?;
        validate_document_id(id)?;
        let now = self.clock.now();

        let mut collections = self.write();
        let docs = collections.entry(collection.to_string()).or_default();
        let doc = match (docs.get(id), expected) {
            (None, None) => Document {
                id: id.to_string(),
                fields,
                created_at: now,
                updated_at: None,
                version: 1,
            },
            (Some(existing), Some(version)) if existing.version == version => Document {
                id: id.to_string(),
                fields,
                created_at: existing.created_at,
                updated_at: Some(now),
                version: Self::next_version(existing),
            },
            _ => return Ok(false),
        };
        docs.insert(id.to_string(), doc);
        Ok(true)
    }

    async fn delete(&self, collection: &str, id: &str) -> StorageResult<bool> {
        validate_collection(collection)?;
        validate_document_id(id)?;
        Ok(self
            .write()
            .get_mut(collection)
            .is_some_and(|docs| docs.remove(id).is_some()))
    }

    async fn delete_if_version(
        &self,
        collection: &str,
        id: &str,
        expected: u64,
    ) -> StorageResult<bool> {
        validate_collection(collection)?;
        validate_document_id(id)?;
        let mut collections = self.write();
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(false);
        };
        if docs.get(id).is_some_and(|doc| doc.version == expected) {
            docs.remove(id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn commit(&self, collection: &str, ops: Vec<BatchOp>) -> StorageResult<u64> {
        validate_collection(collection)?;
        if ops.len() > self.max_batch_size {
            return Err(StorageError::BatchTooLarge {
                size: ops.len(),
                max: self.max_batch_size,
            });
        }
        for op in &ops {
            validate_document_id(op.id())?;
        }
        let now = self.clock.now();

        let mut collections = self.write();
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let mut changed: u64 = 0;
        for op in ops {
            match op {
                BatchOp::Update { id, fields } => {
                    if let Some(doc) = docs.get_mut(&id) {
                        doc.fields.extend(fields);
                        doc.updated_at = Some(now);
                        doc.version = Self::next_version(doc);
                        changed = changed.saturating_add(1);
                    }
                },
                BatchOp::Delete { id } => {
                    if docs.remove(&id).is_some() {
                        changed = changed.saturating_add(1);
                    }
                },
            }
        }
        Ok(changed)
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}
