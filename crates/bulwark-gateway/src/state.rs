//! Shared handler state.

use std::sync::Arc;

use bulwark_admission::{QuotaTracker, RateLimiter, RatePlan};
use bulwark_config::Config;
use bulwark_core::{SharedClock, SystemClock};
use bulwark_failover::{FailoverRouter, FailoverState};
use bulwark_sql::Database;
use bulwark_storage::{DocumentStore, KvNamespace, MemoryDocumentStore};

use crate::config_bridge;
use crate::error::GatewayResult;

/// Components every handler can reach. Cheap to clone.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Token-bucket limiter.
    pub rate_limiter: RateLimiter,
    /// Values filled in when a request plan omits a field.
    pub rate_defaults: RatePlan,
    /// Daily quota tracker.
    pub quota: QuotaTracker,
    /// Key-value namespace.
    pub kv: KvNamespace,
    /// Write router. Not exposed over HTTP; reported by `/health`.
    pub failover: FailoverRouter,
}

impl AppState {
    /// Build every component over `store`, reading time from `clock`.
    ///
    /// # Errors
    ///
    /// Returns an error if the quota tiers, KV namespace or primary endpoint
    /// are unusable.
    pub fn build(
        config: &Config,
        store: Arc<dyn DocumentStore>,
        clock: SharedClock,
    ) -> GatewayResult<Self> {
        let rate_limiter = RateLimiter::with_clock(Arc::clone(&store), Arc::clone(&clock));
        let quota = QuotaTracker::with_clock(
            Arc::clone(&store),
            config_bridge::quota_config(&config.quota),
            Arc::clone(&clock),
        )?;
        let kv = KvNamespace::with_clock(
            Arc::clone(&store),
            config.storage.kv_namespace.clone(),
            Arc::clone(&clock),
        )?;
        let database = Database::with_config(store, config_bridge::database_config(config));
        let primary = config_bridge::primary_store(&config.primary, &config.failover.limit_markers)?;
        let failover = FailoverRouter::new(primary, database, Arc::new(FailoverState::new()))
            .with_enabled(config.failover.enabled)
            .with_clock(clock);

        Ok(Self {
            rate_limiter,
            rate_defaults: config_bridge::rate_defaults(config),
            quota,
            kv,
            failover,
        })
    }

    /// Build over a fresh in-memory store on the system clock.
    ///
    /// # Errors
    ///
    /// See [`build`](Self::build).
    pub fn in_memory(config: &Config) -> GatewayResult<Self> {
        Self::build(
            config,
            Arc::new(MemoryDocumentStore::new()),
            SystemClock::shared(),
        )
    }
}
