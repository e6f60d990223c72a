//! Bulwark Gateway - HTTP boundary for admission control.
//!
//! Exposes the rate limiter, the daily quota tracker and the key-value
//! namespace over JSON routes, and reports write-failover state on
//! `/health`:
//!
//! | Route | Handler |
//! |-------|---------|
//! | `GET /health` | liveness and failover state |
//! | `POST /rate-limit/consume` | token-bucket consume |
//! | `POST /quota/consume` | daily quota consume |
//! | `GET /quota/status` | one principal's usage |
//! | `GET /quota/summary` | the day's totals |
//! | `GET /kv`, `GET/PUT/DELETE /kv/{key}` | key-value namespace |
//!
//! Client mistakes are answered with `400` and `{ "error": message }`.
//! The `bulwarkd` binary loads configuration, sets up logging and serves
//! [`build_router`] until interrupted.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod config_bridge;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use error::{ApiError, GatewayError, GatewayResult};
pub use handlers::{BUCKET_HEADER, DEFAULT_BUCKET};
pub use router::{CORRELATION_HEADER, REQUEST_ID_HEADER, build_router, serve};
pub use state::AppState;
