//! Commonly used admission types.
//!
//! ```rust,ignore
//! use bulwark_admission::prelude::*;
//! ```

pub use crate::{AdmissionError, AdmissionResult};

pub use crate::{ConsumeRequest, DenialReason, QuotaConfig, QuotaDecision, QuotaPlan, QuotaTracker};

pub use crate::{RateDecision, RateLimiter, RatePlan};
