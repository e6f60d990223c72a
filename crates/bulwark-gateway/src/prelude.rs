//! Commonly used gateway types.
//!
//! ```rust,ignore
//! use bulwark_gateway::prelude::*;
//! ```

pub use crate::{ApiError, GatewayError, GatewayResult};

pub use crate::{AppState, build_router, serve};
