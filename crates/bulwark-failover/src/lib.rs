//! Bulwark Failover - primary-first writes with sticky fallback.
//!
//! Writes go to a [`PrimaryStore`] (normally the [`RestPrimaryClient`]).
//! When the primary answers with a rate or usage limit, the shared
//! [`FailoverState`] trips and the [`FailoverRouter`] sends that write, and
//! every later one, to the document store through a
//! [`Database`](bulwark_sql::Database).
//!
//! Failover is logged, never raised: callers see a [`WriteOutcome`] naming
//! the backend that took the write.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod operation;
pub mod primary;
pub mod router;
pub mod state;

pub use error::{FailoverError, FailoverResult, PrimaryError};
pub use operation::{Backend, PrimaryResponse, WriteOperation, WriteOutcome};
pub use primary::{LimitClassifier, PrimaryStore, RestPrimaryClient, RestPrimaryConfig};
pub use router::FailoverRouter;
pub use state::FailoverState;
