//! Documents and the [`DocumentStore`] trait.
//!
//! A document is a flat map of JSON fields filed under a collection and an
//! identifier. The store keeps creation and update timestamps plus a
//! monotonically increasing version next to the fields, never inside them,
//! so bookkeeping is not visible to callers that read `fields`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StorageResult;
use crate::query::Query;

/// Per-commit operation limit shared by document backends.
pub const MAX_BATCH_OPS: usize = 500;

/// Field map of a document.
pub type Fields = Map<String, Value>;

/// A stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Identifier within the collection.
    pub id: String,
    /// User-visible fields.
    pub fields: Fields,
    /// When the document was first written.
    pub created_at: DateTime<Utc>,
    /// When the document was last modified, if ever.
    pub updated_at: Option<DateTime<Utc>>,
    /// Write counter, starting at 1 on creation.
    pub version: u64,
}

impl Document {
    /// Look up a single field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Deserialize the field map into a typed value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`](crate::StorageError::Serialization)
    /// if the fields do not match `T`.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> StorageResult<T> {
        serde_json::from_value(Value::Object(self.fields.clone()))
            .map_err(|e| crate::StorageError::Serialization(e.to_string()))
    }
}

/// Serialize a typed value into a field map.
///
/// # Errors
///
/// Returns [`StorageError::Serialization`](crate::StorageError::Serialization)
/// if `value` does not serialize to a JSON object.
pub fn encode_fields<T: Serialize>(value: &T) -> StorageResult<Fields> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(crate::StorageError::Serialization(format!(
            "expected an object, got {other}"
        ))),
        Err(e) => Err(crate::StorageError::Serialization(e.to_string())),
    }
}

/// One operation inside an atomic commit.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    /// Merge `fields` into an existing document. Missing documents are skipped.
    Update {
        /// Target identifier.
        id: String,
        /// Fields to overwrite.
        fields: Fields,
    },
    /// Remove a document. Missing documents are skipped.
    Delete {
        /// Target identifier.
        id: String,
    },
}

impl BatchOp {
    /// Identifier the operation targets.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Update { id, .. } | Self::Delete { id } => id,
        }
    }
}

/// Document store.
///
/// Implementations hold collections of [`Document`]s and answer [`Query`]s
/// against them. Every method is scoped by a collection name; identifiers are
/// validated with [`validate_document_id`](crate::id::validate_document_id).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document by identifier.
    async fn get(&self, collection: &str, id: &str) -> StorageResult<Option<Document>>;

    /// Run a query and return the matching documents.
    async fn query(&self, query: &Query) -> StorageResult<Vec<Document>>;

    /// Count the documents a query matches, ignoring its limit and offset.
    async fn count(&self, query: &Query) -> StorageResult<u64>;

    /// Create a document, generating an identifier when `id` is `None`.
    ///
    /// Fails with [`StorageError::AlreadyExists`](crate::StorageError::AlreadyExists)
    /// if the identifier is taken.
    async fn create(
        &self,
        collection: &str,
        id: Option<&str>,
        fields: Fields,
    ) -> StorageResult<Document>;

    /// Create or replace a document.
    async fn put(&self, collection: &str, id: &str, fields: Fields) -> StorageResult<Document>;

    /// Replace a document only if its version still equals `expected`.
    ///
    /// `expected == None` means the document must not exist yet. Returns
    /// `false` without writing when the precondition fails.
    async fn put_if_version(
        &self,
        collection: &str,
        id: &str,
        expected: Option<u64>,
        fields: Fields,
    ) -> StorageResult<bool>;

    /// Delete a document. Returns `true` if it existed.
    async fn delete(&self, collection: &str, id: &str) -> StorageResult<bool>;

    /// Delete a document only if its version still equals `expected`.
    async fn delete_if_version(&self, collection: &str, id: &str, expected: u64)
    -> StorageResult<bool>;

    /// Apply a group of operations atomically.
    ///
    /// Returns the number of documents actually changed. Fails with
    /// [`StorageError::BatchTooLarge`](crate::StorageError::BatchTooLarge) if
    /// `ops` is longer than [`max_batch_size`](Self::max_batch_size).
    async fn commit(&self, collection: &str, ops: Vec<BatchOp>) -> StorageResult<u64>;

    /// Largest number of operations one [`commit`](Self::commit) accepts.
    fn max_batch_size(&self) -> usize {
        MAX_BATCH_OPS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Bucket {
        tokens: f64,
        last_refill_ms: i64,
    }

    #[test]
    fn test_encode_decode_fields() {
        let fields = encode_fields(&Bucket {
            tokens: 2.5,
            last_refill_ms: 10,
        })
        .unwrap();
        assert_eq!(fields.get("tokens"), Some(&json!(2.5)));

        let doc = Document {
            id: "b".into(),
            fields,
            created_at: Utc::now(),
            updated_at: None,
            version: 1,
        };
        let bucket: Bucket = doc.decode().unwrap();
        assert_eq!(bucket.last_refill_ms, 10);
    }

    #[test]
    fn test_encode_rejects_non_objects() {
        assert!(encode_fields(&42).is_err());
    }

    #[test]
    fn test_batch_op_id() {
        let op = BatchOp::Delete { id: "x".into() };
        assert_eq!(op.id(), "x");
    }
}
