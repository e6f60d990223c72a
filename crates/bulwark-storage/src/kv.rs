//! TTL-aware key-value namespaces on top of a [`DocumentStore`].
//!
//! Each namespace maps to one collection (`kv_{namespace}`). Keys are
//! escaped with [`escape_key`] to form document identifiers, so any string
//! is a legal key and prefix listings become identifier range scans.
//!
//! # Expiry
//!
//! Entries may carry an absolute expiry. Reads treat expired entries as
//! absent and remove them lazily with a version-conditional delete, so a
//! concurrent rewrite of the same key is never lost.
//!
//! # Ergonomic Access
//!
//! [`KvNamespace`] pre-binds the namespace, and adds typed
//! [`get_json`](KvNamespace::get_json) / [`put_json`](KvNamespace::put_json)
//! helpers on top of the string API.

use std::sync::Arc;

use bulwark_core::{SharedClock, SystemClock};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::document::{Document, DocumentStore, Fields};
use crate::error::{StorageError, StorageResult};
use crate::id::{escape_key, prefix_upper_bound, unescape_key};
use crate::query::Query;

/// Default and maximum page size for [`KvNamespace::list`].
pub const DEFAULT_LIST_LIMIT: usize = 1000;

const FIELD_KEY: &str = "key";
const FIELD_VALUE: &str = "value";
const FIELD_EXPIRES_AT_MS: &str = "expires_at_ms";
const FIELD_METADATA: &str = "metadata";

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate that a namespace can be turned into a collection name.
fn validate_namespace(namespace: &str) -> StorageResult<()> {
    if namespace.is_empty() {
        return Err(StorageError::InvalidKey(
            "namespace must not be empty".into(),
        ));
    }
    if namespace.contains('/') || namespace.contains('\0') {
        return Err(StorageError::InvalidKey(
            "namespace must not contain '/' or null bytes".into(),
        ));
    }
    Ok(())
}

fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("key must not be empty".into()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Options for [`KvNamespace::put`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutOptions {
    /// Relative lifetime in seconds. Takes precedence over `expiration`.
    pub expiration_ttl: Option<u64>,
    /// Absolute expiry as Unix seconds.
    pub expiration: Option<i64>,
    /// Arbitrary JSON stored alongside the value.
    pub metadata: Option<Value>,
}

impl PutOptions {
    /// Expire `secs` seconds after the write.
    #[must_use]
    pub fn ttl(secs: u64) -> Self {
        Self {
            expiration_ttl: Some(secs),
            ..Self::default()
        }
    }

    /// Attach metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Options for [`KvNamespace::list`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOptions {
    /// Only list keys starting with this prefix.
    pub prefix: Option<String>,
    /// Page size, default and maximum [`DEFAULT_LIST_LIMIT`].
    pub limit: Option<usize>,
    /// Cursor returned by a previous page.
    pub cursor: Option<String>,
}

/// One key in a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyInfo {
    /// The original key.
    pub name: String,
    /// Absolute expiry as Unix seconds, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<i64>,
    /// Metadata stored with the key, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// A page of keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResult {
    /// Keys on this page, in identifier order.
    pub keys: Vec<KeyInfo>,
    /// `true` when no further pages exist.
    pub list_complete: bool,
    /// Cursor for the next page when `list_complete` is `false`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// A value together with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueWithMetadata {
    /// Stored value.
    pub value: String,
    /// Metadata stored with the value, if any.
    pub metadata: Option<Value>,
}

// ---------------------------------------------------------------------------
// Namespace
// ---------------------------------------------------------------------------

/// A key-value namespace backed by a document collection.
#[derive(Clone)]
pub struct KvNamespace {
    store: Arc<dyn DocumentStore>,
    namespace: String,
    collection: String,
    clock: SharedClock,
}

impl std::fmt::Debug for KvNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvNamespace")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl KvNamespace {
    /// Bind `namespace` on `store`, reading time from the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] if the namespace is empty or
    /// contains `/` or null bytes.
    pub fn new(store: Arc<dyn DocumentStore>, namespace: impl Into<String>) -> StorageResult<Self> {
        Self::with_clock(store, namespace, SystemClock::shared())
    }

    /// Bind `namespace` on `store` with an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] if the namespace is invalid.
    pub fn with_clock(
        store: Arc<dyn DocumentStore>,
        namespace: impl Into<String>,
        clock: SharedClock,
    ) -> StorageResult<Self> {
        let namespace = namespace.into();
        validate_namespace(&namespace)?;
        Ok(Self {
            collection: format!("kv_{namespace}"),
            store,
            namespace,
            clock,
        })
    }

    /// The bound namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Backing collection name.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn is_expired(&self, doc: &Document) -> bool {
        doc.fields
            .get(FIELD_EXPIRES_AT_MS)
            .and_then(Value::as_i64)
            .is_some_and(|at| self.clock.now_ms() >= at)
    }

    /// Read a live document, deleting it if it has expired.
    async fn live_document(&self, key: &str) -> StorageResult<Option<Document>> {
        validate_key(key)?;
        let id = escape_key(key);
        let Some(doc) = self.store.get(&self.collection, &id).await? else {
            return Ok(None);
        };
        if self.is_expired(&doc) {
            let removed = self
                .store
                .delete_if_version(&self.collection, &id, doc.version)
                .await?;
            tracing::debug!(namespace = %self.namespace, key, removed, "Expired KV entry");
            return Ok(None);
        }
        Ok(Some(doc))
    }

    /// Get a value. Expired and missing keys both read as `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty or the store fails.
    pub async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self
            .live_document(key)
            .await?
            .and_then(|doc| value_of(&doc)))
    }

    /// Get a value together with its metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty or the store fails.
    pub async fn get_with_metadata(&self, key: &str) -> StorageResult<Option<ValueWithMetadata>> {
        Ok(self.live_document(key).await?.and_then(|doc| {
            value_of(&doc).map(|value| ValueWithMetadata {
                value,
                metadata: doc.fields.get(FIELD_METADATA).cloned(),
            })
        }))
    }

    /// Write a value, replacing any previous value and options.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidArgument`] for a zero TTL or an expiry
    /// that is already in the past, and propagates store failures.
    pub async fn put(&self, key: &str, value: &str, options: PutOptions) -> StorageResult<()> {
        validate_key(key)?;
        let now_ms = self.clock.now_ms();
        let expires_at_ms = match (options.expiration_ttl, options.expiration) {
            (Some(0), _) => {
                return Err(StorageError::InvalidArgument(
                    "expiration_ttl must be at least 1 second".into(),
                ));
            },
            (Some(ttl), _) => {
                let ttl_ms = i64::try_from(ttl.saturating_mul(1000)).unwrap_or(i64::MAX);
                Some(now_ms.saturating_add(ttl_ms))
            },
            (None, Some(at)) => {
                let at_ms = at.saturating_mul(1000);
                if at_ms <= now_ms {
                    return Err(StorageError::InvalidArgument(format!(
                        "expiration {at} is not in the future"
                    )));
                }
                Some(at_ms)
            },
            (None, None) => None,
        };

        let mut fields = Map::new();
        fields.insert(FIELD_KEY.into(), Value::String(key.to_string()));
        fields.insert(FIELD_VALUE.into(), Value::String(value.to_string()));
        if let Some(at) = expires_at_ms {
            fields.insert(FIELD_EXPIRES_AT_MS.into(), Value::from(at));
        }
        if let Some(metadata) = options.metadata {
            fields.insert(FIELD_METADATA.into(), metadata);
        }
        self.store
            .put(&self.collection, &escape_key(key), fields)
            .await?;
        Ok(())
    }

    /// Delete a key. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty or the store fails.
    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.store.delete(&self.collection, &escape_key(key)).await?;
        Ok(())
    }

    /// List keys in identifier order, one page at a time.
    ///
    /// Expired entries are skipped but still count against the page, so a
    /// page may hold fewer than `limit` keys while `list_complete` is `false`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidArgument`] for a zero limit and
    /// propagates store failures.
    pub async fn list(&self, options: ListOptions) -> StorageResult<ListResult> {
        let limit = options.limit.unwrap_or(DEFAULT_LIST_LIMIT);
        if limit == 0 {
            return Err(StorageError::InvalidArgument(
                "list limit must be at least 1".into(),
            ));
        }
        let limit = limit.min(DEFAULT_LIST_LIMIT);

        let mut query = Query::new(self.collection.clone()).limit(limit.saturating_add(1));
        if let Some(prefix) = options.prefix.as_deref().filter(|p| !p.is_empty()) {
            let start = escape_key(prefix);
            let end = prefix_upper_bound(&start);
            query = query.id_range(Some(start), end);
        }
        if let Some(cursor) = options.cursor {
            query = query.start_after(cursor);
        }

        let mut docs = self.store.query(&query).await?;
        let list_complete = docs.len() <= limit;
        docs.truncate(limit);
        let cursor = if list_complete {
            None
        } else {
            docs.last().map(|doc| doc.id.clone())
        };

        let keys = docs
            .iter()
            .filter(|doc| !self.is_expired(doc))
            .filter_map(key_info)
            .collect();
        Ok(ListResult {
            keys,
            list_complete,
            cursor,
        })
    }

    /// Get a JSON value and deserialize it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if the stored value does not
    /// deserialize to `T`.
    pub async fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        match self.get(key).await? {
            Some(raw) => {
                let value = serde_json::from_str(&raw)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(Some(value))
            },
            None => Ok(None),
        }
    }

    /// Serialize a value as JSON and store it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if serialization fails.
    pub async fn put_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        options: PutOptions,
    ) -> StorageResult<()> {
        let raw =
            serde_json::to_string(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.put(key, &raw, options).await
    }
}

fn value_of(doc: &Document) -> Option<String> {
    doc.fields
        .get(FIELD_VALUE)
        .and_then(Value::as_str)
        .map(String::from)
}

fn key_info(doc: &Document) -> Option<KeyInfo> {
    let fields: &Fields = &doc.fields;
    let name = match fields.get(FIELD_KEY).and_then(Value::as_str) {
        Some(name) => name.to_string(),
        None => unescape_key(&doc.id).ok()?,
    };
    Some(KeyInfo {
        name,
        expiration: fields
            .get(FIELD_EXPIRES_AT_MS)
            .and_then(Value::as_i64)
            .map(|ms| ms.div_euclid(1000)),
        metadata: fields.get(FIELD_METADATA).cloned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDocumentStore;
    use bulwark_core::ManualClock;
    use serde_json::json;

    fn namespace(clock: &ManualClock) -> (Arc<MemoryDocumentStore>, KvNamespace) {
        let store = Arc::new(MemoryDocumentStore::with_clock(clock.shared()));
        let kv = KvNamespace::with_clock(store.clone(), "sessions", clock.shared()).unwrap();
        (store, kv)
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let clock = ManualClock::at_ms(0);
        let (_, kv) = namespace(&clock);
        kv.put("user/1", "alice", PutOptions::default()).await.unwrap();
        assert_eq!(kv.get("user/1").await.unwrap().as_deref(), Some("alice"));

        kv.delete("user/1").await.unwrap();
        assert!(kv.get("user/1").await.unwrap().is_none());
        kv.delete("user/1").await.unwrap();
    }

    #[tokio::test]
    async fn test_ttl_expiry_removes_lazily() {
        let clock = ManualClock::at_ms(10_000);
        let (store, kv) = namespace(&clock);
        kv.put("k", "v", PutOptions::ttl(1)).await.unwrap();

        clock.advance_ms(999);
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("v"));

        clock.advance_ms(2);
        assert!(kv.get("k").await.unwrap().is_none());
        assert!(store.is_empty(kv.collection()));
    }

    #[tokio::test]
    async fn test_metadata_roundtrip() {
        let clock = ManualClock::at_ms(0);
        let (_, kv) = namespace(&clock);
        kv.put(
            "k",
            "v",
            PutOptions::default().with_metadata(json!({"owner": "ops"})),
        )
        .await
        .unwrap();
        let got = kv.get_with_metadata("k").await.unwrap().unwrap();
        assert_eq!(got.value, "v");
        assert_eq!(got.metadata, Some(json!({"owner": "ops"})));
    }

    #[tokio::test]
    async fn test_invalid_expiry_rejected() {
        let clock = ManualClock::at_ms(5_000);
        let (_, kv) = namespace(&clock);
        assert!(kv.put("k", "v", PutOptions::ttl(0)).await.is_err());
        let past = PutOptions {
            expiration: Some(4),
            ..PutOptions::default()
        };
        assert!(kv.put("k", "v", past).await.is_err());
        assert!(kv.put("", "v", PutOptions::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_list_prefix_pagination() {
        let clock = ManualClock::at_ms(0);
        let (_, kv) = namespace(&clock);
        for key in ["user/a", "user/b", "user/c", "users", "admin"] {
            kv.put(key, "1", PutOptions::default()).await.unwrap();
        }

        let first = kv
            .list(ListOptions {
                prefix: Some("user/".into()),
                limit: Some(2),
                cursor: None,
            })
            .await
            .unwrap();
        let names: Vec<_> = first.keys.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, ["user/a", "user/b"]);
        assert!(!first.list_complete);
        assert_eq!(first.cursor.as_deref(), Some(escape_key("user/b").as_str()));

        let second = kv
            .list(ListOptions {
                prefix: Some("user/".into()),
                limit: Some(2),
                cursor: first.cursor,
            })
            .await
            .unwrap();
        let names: Vec<_> = second.keys.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, ["user/c"]);
        assert!(second.list_complete);
        assert!(second.cursor.is_none());
    }

    #[tokio::test]
    async fn test_list_reports_expiration_and_skips_expired() {
        let clock = ManualClock::at_ms(1_000);
        let (_, kv) = namespace(&clock);
        kv.put("short", "v", PutOptions::ttl(1)).await.unwrap();
        kv.put("long", "v", PutOptions::ttl(60)).await.unwrap();
        clock.advance_ms(1_500);

        let page = kv.list(ListOptions::default()).await.unwrap();
        assert_eq!(page.keys.len(), 1);
        assert_eq!(page.keys[0].name, "long");
        assert_eq!(page.keys[0].expiration, Some(61));
        assert!(page.list_complete);
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let clock = ManualClock::at_ms(0);
        let (_, kv) = namespace(&clock);
        kv.put_json("cfg", &json!({"a": 1}), PutOptions::default())
            .await
            .unwrap();
        let got: Option<Value> = kv.get_json("cfg").await.unwrap();
        assert_eq!(got, Some(json!({"a": 1})));
    }

    #[test]
    fn test_namespace_validation() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        assert!(KvNamespace::new(store.clone(), "").is_err());
        assert!(KvNamespace::new(store.clone(), "a/b").is_err());
        assert_eq!(KvNamespace::new(store, "ok").unwrap().collection(), "kv_ok");
    }

    #[tokio::test]
    async fn test_list_result_serializes_camel_case() {
        let clock = ManualClock::at_ms(0);
        let (_, kv) = namespace(&clock);
        kv.put("a", "v", PutOptions::default()).await.unwrap();

        let page = serde_json::to_value(kv.list(ListOptions::default()).await.unwrap()).unwrap();
        assert_eq!(page["listComplete"], true);
        assert!(page.get("list_complete").is_none());
        assert!(page.get("cursor").is_none());
        assert_eq!(page["keys"][0]["name"], "a");
    }
}
