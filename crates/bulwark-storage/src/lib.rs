//! Bulwark Storage - document persistence for the edge.
//!
//! Two layers, one backend:
//!
//! # Documents ([`DocumentStore`])
//!
//! Collections of JSON documents with creation/update bookkeeping and a
//! per-document version. The store answers [`Query`]s (equality, range and
//! `LIKE` filters, ordering, offset/limit, identifier ranges) and applies
//! batched updates and deletes atomically up to a per-commit limit
//! ([`MAX_BATCH_OPS`]). Version-conditional writes make optimistic
//! transactions possible on top of it.
//!
//! The bundled backend is [`MemoryDocumentStore`]. Anything that implements
//! the trait (a hosted document database, for instance) plugs in unchanged.
//!
//! # Key-Value ([`KvNamespace`])
//!
//! String values under arbitrary string keys, with optional TTL/absolute
//! expiry, JSON metadata and cursor-paginated prefix listings. Each namespace
//! lives in its own collection; keys are escaped into legal identifiers.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod document;
pub mod error;
pub mod id;
pub mod kv;
pub mod memory;
pub mod query;

pub use document::{BatchOp, Document, DocumentStore, Fields, MAX_BATCH_OPS, encode_fields};
pub use error::{StorageError, StorageResult};
pub use kv::{KeyInfo, KvNamespace, ListOptions, ListResult, PutOptions, ValueWithMetadata};
pub use memory::MemoryDocumentStore;
pub use query::{Direction, Filter, FilterOp, OrderBy, Query};
