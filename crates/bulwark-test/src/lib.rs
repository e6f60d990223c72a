//! Bulwark Test - shared test utilities.
//!
//! Mock stores and harness helpers used as a dev-dependency across the
//! workspace.
//!
//! ```rust,ignore
//! use bulwark_test::{ScriptedPrimary, FailingDocumentStore};
//! use bulwark_failover::PrimaryError;
//!
//! let primary = ScriptedPrimary::new()
//!     .with_success(1)
//!     .with_error(PrimaryError::Limited { status: 429, message: "slow down".into() });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod harness;
pub mod primary;
pub mod store;

pub use harness::*;
pub use primary::*;
pub use store::*;
