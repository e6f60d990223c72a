//! Bulwark Telemetry - logging setup and request correlation.
//!
//! - [`setup_logging`] installs the global `tracing` subscriber described by a
//!   [`LogConfig`]: level plus per-target directives, one of four formats,
//!   and stdout, stderr or a daily-rotated file as the sink.
//! - [`RequestContext`] carries the identifiers of one inbound request and
//!   opens the span every log line of that request is recorded under.
//!
//! # Example
//!
//! ```rust,no_run
//! use bulwark_telemetry::{LogConfig, LogFormat, RequestContext, setup_logging};
//!
//! # fn main() -> Result<(), bulwark_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Json)
//!     .with_directive("bulwark_sql=debug");
//! setup_logging(&config)?;
//!
//! let ctx = RequestContext::new("POST", "/quota/consume");
//! let _entered = ctx.span().entered();
//! tracing::info!("Handling request");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod context;
mod error;
mod logging;

pub use context::RequestContext;
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging};
