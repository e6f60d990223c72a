//! Bulwark Admission - rate limiting and daily quotas.
//!
//! Two independent gates, both persisted through a
//! [`DocumentStore`](bulwark_storage::DocumentStore) so every instance of a
//! service sees the same state:
//!
//! - [`RateLimiter`]: a token bucket per caller-chosen bucket name. Refill is
//!   continuous (`limit_per_minute / 60 000` tokens per millisecond) and the
//!   bucket holds at most `burst` tokens.
//! - [`QuotaTracker`]: per-principal daily limits by plan tier, a per-tier
//!   global threshold, and a hard global ceiling, all reset at UTC midnight.
//!
//! Neither gate ever reports a denial as an error; callers branch on
//! `allowed`.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod error;
pub mod plan;
pub mod quota;
pub mod rate_limit;

pub use error::{AdmissionError, AdmissionResult};
pub use plan::{
    DEFAULT_GLOBAL_CEILING, DEFAULT_MAX_SESSIONS, DEFAULT_TOP_PRINCIPALS, QuotaConfig, QuotaPlan,
    default_plans,
};
pub use quota::{
    ConsumeRequest, DenialReason, PrincipalUsage, QUOTA_COLLECTION, QuotaDay, QuotaDecision,
    QuotaStatus, QuotaSummary, QuotaTracker,
};
pub use rate_limit::{BUCKET_COLLECTION, BucketState, RateDecision, RateLimiter, RatePlan};
