//! Commonly used test utilities.
//!
//! ```rust,ignore
//! use bulwark_test::prelude::*;
//! ```

pub use crate::{FailingDocumentStore, ScriptedPrimary};

pub use crate::{setup_test_logging, setup_test_logging_default, test_file};
