//! Quota plan tiers and tracker configuration.
//!
//! One table is canonical:
//!
//! | Tier         | Daily limit per principal | Global threshold |
//! |--------------|---------------------------|------------------|
//! | `free`       | 50                        | 5 000            |
//! | `pro`        | 1 000                     | 20 000           |
//! | `enterprise` | 10 000                    | 45 000           |
//!
//! The hard ceiling shared by every tier is 50 000 units per UTC day.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AdmissionError, AdmissionResult};

/// Limits for one plan tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaPlan {
    /// Units one principal on this tier may consume per UTC day.
    pub daily_limit: u64,
    /// Global usage above which this tier is refused, even if the principal
    /// still has budget.
    pub global_threshold: u64,
}

impl QuotaPlan {
    /// Create a plan.
    #[must_use]
    pub const fn new(daily_limit: u64, global_threshold: u64) -> Self {
        Self {
            daily_limit,
            global_threshold,
        }
    }
}

/// Default hard ceiling across all tiers.
pub const DEFAULT_GLOBAL_CEILING: u64 = 50_000;
/// Default cap on distinct session hashes recorded per day.
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;
/// Default number of principals reported by a summary.
pub const DEFAULT_TOP_PRINCIPALS: usize = 10;

/// The canonical plan table.
#[must_use]
pub fn default_plans() -> BTreeMap<String, QuotaPlan> {
    BTreeMap::from([
        ("free".to_string(), QuotaPlan::new(50, 5_000)),
        ("pro".to_string(), QuotaPlan::new(1_000, 20_000)),
        ("enterprise".to_string(), QuotaPlan::new(10_000, 45_000)),
    ])
}

/// Quota tracker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Hard ceiling on global usage per UTC day.
    pub global_ceiling: u64,
    /// Most session hashes kept per day.
    pub max_sessions: usize,
    /// Principals listed by [`summary`](crate::QuotaTracker::summary).
    pub top_principals: usize,
    /// Plan tiers by name.
    pub plans: BTreeMap<String, QuotaPlan>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            global_ceiling: DEFAULT_GLOBAL_CEILING,
            max_sessions: DEFAULT_MAX_SESSIONS,
            top_principals: DEFAULT_TOP_PRINCIPALS,
            plans: default_plans(),
        }
    }
}

impl QuotaConfig {
    /// Look up a tier by name (ASCII case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::UnknownPlan`] if no such tier is configured.
    pub fn plan(&self, name: &str) -> AdmissionResult<QuotaPlan> {
        self.plans
            .get(name)
            .or_else(|| {
                self.plans
                    .iter()
                    .find(|(tier, _)| tier.eq_ignore_ascii_case(name))
                    .map(|(_, plan)| plan)
            })
            .copied()
            .ok_or_else(|| AdmissionError::UnknownPlan(name.to_string()))
    }

    /// Check internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::InvalidPlan`] when there are no tiers, a tier
    /// allows nothing, or a tier's threshold is above the global ceiling.
    pub fn validate(&self) -> AdmissionResult<()> {
        if self.plans.is_empty() {
            return Err(AdmissionError::InvalidPlan(
                "at least one plan tier must be configured".into(),
            ));
        }
        for (name, plan) in &self.plans {
            if plan.daily_limit == 0 {
                return Err(AdmissionError::InvalidPlan(format!(
                    "plan {name}: daily_limit must be greater than 0"
                )));
            }
            if plan.global_threshold > self.global_ceiling {
                return Err(AdmissionError::InvalidPlan(format!(
                    "plan {name}: global_threshold {} exceeds global ceiling {}",
                    plan.global_threshold, self.global_ceiling
                )));
            }
        }
        Ok(())
    }
}
