//! Token-bucket rate limiting.
//!
//! Buckets are named by the caller and persisted as documents, so every
//! instance sharing a store shares the buckets. Each call loads the bucket,
//! refills it for the time elapsed, tries to take `cost` tokens and writes
//! the bucket back whether or not the request was allowed.
//!
//! The load and the write are separate store calls with no isolation between
//! them. Two concurrent calls on the same bucket can both see the same token
//! count and jointly admit more than the plan allows. Buckets shape bursts on
//! a best-effort basis; they are not a hard guarantee.

use std::sync::Arc;

use bulwark_core::{SharedClock, SystemClock};
use bulwark_storage::{DocumentStore, encode_fields, id::escape_key};
use serde::{Deserialize, Serialize};

use crate::error::{AdmissionError, AdmissionResult};

/// Default collection holding bucket state.
pub const BUCKET_COLLECTION: &str = "rate_limit_buckets";

const MS_PER_MINUTE: f64 = 60_000.0;

/// Configuration for a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatePlan {
    /// Sustained refill rate.
    pub limit_per_minute: u32,
    /// Bucket capacity.
    pub burst: u32,
}

impl RatePlan {
    /// Create a plan.
    #[must_use]
    pub const fn new(limit_per_minute: u32, burst: u32) -> Self {
        Self {
            limit_per_minute,
            burst,
        }
    }

    /// Create a plan whose burst equals its per-minute rate.
    #[must_use]
    pub const fn per_minute(requests: u32) -> Self {
        Self::new(requests, requests)
    }

    /// Check that the plan can ever admit anything.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::InvalidPlan`] if either field is zero.
    pub fn validate(&self) -> AdmissionResult<()> {
        if self.limit_per_minute == 0 {
            return Err(AdmissionError::InvalidPlan(
                "limitPerMinute must be greater than 0".into(),
            ));
        }
        if self.burst == 0 {
            return Err(AdmissionError::InvalidPlan(
                "burst must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

impl Default for RatePlan {
    fn default() -> Self {
        Self::new(60, 10)
    }
}

/// Persisted bucket state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketState {
    /// Tokens available, within `[0, burst]`.
    pub tokens: f64,
    /// When the bucket was last refilled (Unix ms).
    pub last_refill_ms: i64,
}

impl BucketState {
    /// A full bucket.
    #[must_use]
    pub fn full(plan: RatePlan, now_ms: i64) -> Self {
        Self {
            tokens: f64::from(plan.burst),
            last_refill_ms: now_ms,
        }
    }

    /// Refill for the time elapsed since the last refill.
    ///
    /// Time running backwards adds nothing and leaves the refill mark alone.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // elapsed milliseconds are far below 2^52
    pub fn refilled(self, plan: RatePlan, now_ms: i64) -> Self {
        let elapsed = now_ms.saturating_sub(self.last_refill_ms).max(0) as f64;
        let burst = f64::from(plan.burst);
        let tokens = (self.tokens + elapsed * f64::from(plan.limit_per_minute) / MS_PER_MINUTE)
            .clamp(0.0, burst);
        Self {
            tokens,
            last_refill_ms: now_ms.max(self.last_refill_ms),
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Whole tokens left after this request.
    pub remaining: u64,
    /// The plan's per-minute limit.
    pub limit: u32,
    /// Milliseconds until at least one token is available (0 if one is now).
    pub reset_ms: u64,
}

impl RateDecision {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // clamped to [0, burst] and rounded first
    fn from_tokens(allowed: bool, tokens: f64, plan: RatePlan) -> Self {
        let reset_ms = if tokens >= 1.0 {
            0
        } else {
            ((1.0 - tokens) * MS_PER_MINUTE / f64::from(plan.limit_per_minute))
                .ceil()
                .max(0.0) as u64
        };
        Self {
            allowed,
            remaining: tokens.floor().max(0.0) as u64,
            limit: plan.limit_per_minute,
            reset_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// Limiter
// ---------------------------------------------------------------------------

/// Token-bucket rate limiter over a [`DocumentStore`].
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn DocumentStore>,
    collection: String,
    clock: SharedClock,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Create a limiter on the system clock.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_clock(store, SystemClock::shared())
    }

    /// Create a limiter that reads "now" from `clock` when the caller gives
    /// no explicit time.
    #[must_use]
    pub fn with_clock(store: Arc<dyn DocumentStore>, clock: SharedClock) -> Self {
        Self {
            store,
            collection: BUCKET_COLLECTION.to_string(),
            clock,
        }
    }

    /// Store buckets in a different collection.
    #[must_use]
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Current bucket state, without refilling.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket name is empty or the store fails.
    pub async fn state(&self, bucket: &str) -> AdmissionResult<Option<BucketState>> {
        let id = bucket_id(bucket)?;
        match self.store.get(&self.collection, &id).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    async fn load(&self, id: &str, plan: RatePlan, now_ms: i64) -> AdmissionResult<BucketState> {
        let state = match self.store.get(&self.collection, id).await? {
            Some(doc) => doc.decode::<BucketState>()?,
            None => BucketState::full(plan, now_ms),
        };
        Ok(state.refilled(plan, now_ms))
    }

    /// Try to take `cost` tokens from `bucket`.
    ///
    /// `now_ms` defaults to the limiter's clock. The bucket is written back
    /// on every call, allowed or not.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::InvalidPlan`] for a zero rate or burst,
    /// [`AdmissionError::InvalidRequest`] for an empty bucket name, and
    /// propagates store failures.
    pub async fn consume(
        &self,
        bucket: &str,
        plan: RatePlan,
        cost: u32,
        now_ms: Option<i64>,
    ) -> AdmissionResult<RateDecision> {
        plan.validate()?;
        let id = bucket_id(bucket)?;
        let now_ms = now_ms.unwrap_or_else(|| self.clock.now_ms());

        let mut state = self.load(&id, plan, now_ms).await?;
        let cost = f64::from(cost);
        let allowed = state.tokens >= cost;
        if allowed {
            state.tokens -= cost;
        }

        self.store
            .put(&self.collection, &id, encode_fields(&state)?)
            .await?;

        let decision = RateDecision::from_tokens(allowed, state.tokens, plan);
        if allowed {
            tracing::debug!(bucket, remaining = decision.remaining, "Rate limit consume allowed");
        } else {
            tracing::debug!(bucket, reset_ms = decision.reset_ms, "Rate limit consume denied");
        }
        Ok(decision)
    }

    /// What [`consume`](Self::consume) with cost 1 would decide, without
    /// taking a token or writing anything.
    ///
    /// # Errors
    ///
    /// Same as [`consume`](Self::consume).
    pub async fn peek(
        &self,
        bucket: &str,
        plan: RatePlan,
        now_ms: Option<i64>,
    ) -> AdmissionResult<RateDecision> {
        plan.validate()?;
        let id = bucket_id(bucket)?;
        let now_ms = now_ms.unwrap_or_else(|| self.clock.now_ms());
        let state = self.load(&id, plan, now_ms).await?;
        Ok(RateDecision::from_tokens(state.tokens >= 1.0, state.tokens, plan))
    }
}

fn bucket_id(bucket: &str) -> AdmissionResult<String> {
    if bucket.is_empty() {
        return Err(AdmissionError::InvalidRequest(
            "bucket name must not be empty".into(),
        ));
    }
    Ok(escape_key(bucket))
}
