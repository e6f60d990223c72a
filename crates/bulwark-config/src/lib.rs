//! Layered configuration for Bulwark.
//!
//! One [`Config`] describes every component: logging, the HTTP gateway,
//! storage, rate-limit defaults, quota tiers, the primary store and
//! failover.
//!
//! # Precedence
//!
//! From highest to lowest:
//!
//! 1. The explicit file (`bulwarkd --config PATH`)
//! 2. User (`~/.bulwark/config.toml`)
//! 3. System (`/etc/bulwark/config.toml`)
//! 4. Environment (`BULWARK_*`), only for fields no file set
//! 5. Embedded defaults
//!
//! String values may reference the environment as `${VAR}`.
//!
//! This crate depends on no other Bulwark crate. Conversion into domain
//! types happens where the configuration is consumed.
//!
//! ```rust,no_run
//! use bulwark_config::Config;
//!
//! let resolved = Config::load(None).unwrap();
//! println!("listening on {}", resolved.config.gateway.bind);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Environment fallbacks and `${VAR}` references.
pub mod env;
/// Configuration error types.
pub mod error;
/// File discovery and layered loading.
pub mod loader;
/// Layer merging with provenance.
pub mod merge;
/// Configuration schema.
pub mod types;
/// Range and cross-field checks.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{LoadOptions, ResolvedConfig};
pub use merge::{ConfigLayer, FieldSources};
pub use types::*;

impl Config {
    /// Load with the full precedence chain and the process environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a file is malformed or the result fails
    /// validation.
    pub fn load(explicit: Option<&std::path::Path>) -> ConfigResult<ResolvedConfig> {
        loader::load(&LoadOptions::standard(explicit))
    }

    /// Validate this configuration.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError::ValidationError`] found.
    pub fn validate(&self) -> ConfigResult<()> {
        validate::validate(self)
    }
}
