//! Bulwark SQL - a constrained SQL dialect over a document store.
//!
//! Services written against a relational prepared-statement API keep working
//! when their data lives in a document store. The pieces:
//!
//! - [`compile`]: tokenizer plus recursive-descent parser producing a
//!   [`ParsedStatement`] for the five supported forms (`SELECT`,
//!   `SELECT COUNT(*)`, `INSERT`, `UPDATE`, `DELETE`). Anything outside the
//!   dialect degrades to a best-effort descriptor instead of an error.
//! - [`Database`] / [`Statement`]: `prepare` → `bind` → `run`/`all`/`first`/
//!   `raw`, plus sequential `batch` and one-shot `exec`. Tables are
//!   collections, rows are documents, bookkeeping never leaks into rows.
//!
//! # Example
//!
//! ```rust,ignore
//! let db = Database::new(Arc::new(MemoryDocumentStore::new()));
//! db.prepare("INSERT INTO users (id, name) VALUES (?, ?)")
//!     .bind(["u1", "Ada"])
//!     .run()
//!     .await?;
//! let name = db
//!     .prepare("SELECT name FROM users WHERE id = ?")
//!     .bind(["u1"])
//!     .first(Some("name"))
//!     .await?;
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod database;
pub mod error;
pub mod executor;
mod lexer;
pub mod parsed;
pub mod parser;

pub use database::{Database, DatabaseConfig, Statement};
pub use error::{SqlError, SqlResult};
pub use executor::{QueryMeta, QueryResult, Row};
pub use parsed::{Operand, Operation, ParsedStatement, WhereClause};
pub use parser::compile;
