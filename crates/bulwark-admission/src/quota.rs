//! Tiered daily quotas with a shared global ceiling.
//!
//! All usage for the current UTC day lives in one document (`current`). A
//! consume reads it, checks the limits, and writes it back only if nobody
//! else wrote in between (version-conditional put), retrying a bounded
//! number of times. That makes the read-check-write a single atomic step
//! from the point of view of every other consumer.
//!
//! When the stored day is not today the tracker starts a fresh day. The old
//! one is first kept as an immutable snapshot filed under its date and is
//! never touched again. The live document is only reset once that snapshot
//! exists, so a failed archive leaves the old day in place for the next
//! consume to try again.
//!
//! Checks run in a fixed order and the first failure wins:
//!
//! 1. the hard global ceiling,
//! 2. the calling plan's global threshold,
//! 3. the principal's own daily limit.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use bulwark_core::{SharedClock, SystemClock, next_utc_midnight, utc_day};
use bulwark_storage::{DocumentStore, StorageError, encode_fields};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AdmissionError, AdmissionResult};
use crate::plan::{QuotaConfig, QuotaPlan};

/// Default collection holding quota days.
pub const QUOTA_COLLECTION: &str = "quota_days";

/// Identifier of the live day document.
const CURRENT_DAY_ID: &str = "current";

/// Optimistic write attempts before giving up.
const MAX_ATTEMPTS: u32 = 5;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Usage for one UTC day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaDay {
    /// `YYYY-MM-DD`.
    pub date: String,
    /// Units used per principal.
    pub per_principal_used: BTreeMap<String, u64>,
    /// Units used across every principal.
    pub global_used: u64,
    /// Distinct session hashes seen, capped.
    pub session_set: BTreeSet<String>,
}

impl QuotaDay {
    /// An empty day.
    #[must_use]
    pub fn new(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            ..Self::default()
        }
    }

    /// Units used by `principal`.
    #[must_use]
    pub fn used_by(&self, principal: &str) -> u64 {
        self.per_principal_used.get(principal).copied().unwrap_or(0)
    }

    /// Principals sorted by usage, highest first, ties by name.
    #[must_use]
    pub fn top_principals(&self, n: usize) -> Vec<PrincipalUsage> {
        let mut all: Vec<PrincipalUsage> = self
            .per_principal_used
            .iter()
            .map(|(principal_id, used)| PrincipalUsage {
                principal_id: principal_id.clone(),
                used: *used,
            })
            .collect();
        all.sort_by(|a, b| {
            b.used
                .cmp(&a.used)
                .then_with(|| a.principal_id.cmp(&b.principal_id))
        });
        all.truncate(n);
        all
    }

    /// Evaluate a consume against this day, mutating it only when allowed.
    ///
    /// Returns the denial reason, if any, and whether the day changed (a
    /// denied consume can still record a new session hash).
    fn apply(
        &mut self,
        request: &ConsumeRequest,
        plan: QuotaPlan,
        config: &QuotaConfig,
    ) -> (Option<DenialReason>, bool) {
        let mut changed = false;
        if let Some(hash) = request.session_hash.as_deref().filter(|h| !h.is_empty())
            && !self.session_set.contains(hash)
            && self.session_set.len() < config.max_sessions
        {
            self.session_set.insert(hash.to_string());
            changed = true;
        }

        let global_after = self.global_used.saturating_add(request.cost);
        let principal_after = self.used_by(&request.principal_id).saturating_add(request.cost);
        let reason = if global_after > config.global_ceiling {
            Some(DenialReason::GlobalCeilingExceeded)
        } else if global_after > plan.global_threshold {
            Some(DenialReason::PlanThresholdExceeded)
        } else if principal_after > plan.daily_limit {
            Some(DenialReason::DailyLimitExceeded)
        } else {
            None
        };

        if reason.is_none() && request.cost > 0 {
            self.global_used = global_after;
            self.per_principal_used
                .insert(request.principal_id.clone(), principal_after);
            changed = true;
        }
        (reason, changed)
    }
}

/// Why a consume was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// The system-wide hard ceiling would be exceeded.
    GlobalCeilingExceeded,
    /// The plan tier's global threshold would be exceeded.
    PlanThresholdExceeded,
    /// The principal's own daily limit would be exceeded.
    DailyLimitExceeded,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GlobalCeilingExceeded => write!(f, "global_ceiling_exceeded"),
            Self::PlanThresholdExceeded => write!(f, "plan_threshold_exceeded"),
            Self::DailyLimitExceeded => write!(f, "daily_limit_exceeded"),
        }
    }
}

/// A request to consume quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeRequest {
    /// Who is consuming.
    pub principal_id: String,
    /// Plan tier name.
    pub plan: String,
    /// Units to consume.
    #[serde(default = "default_cost")]
    pub cost: u64,
    /// Optional session fingerprint, recorded for distinct-session telemetry.
    #[serde(default)]
    pub session_hash: Option<String>,
}

fn default_cost() -> u64 {
    1
}

impl ConsumeRequest {
    /// Consume one unit for `principal_id` on `plan`.
    #[must_use]
    pub fn new(principal_id: impl Into<String>, plan: impl Into<String>) -> Self {
        Self {
            principal_id: principal_id.into(),
            plan: plan.into(),
            cost: default_cost(),
            session_hash: None,
        }
    }

    /// Set the cost.
    #[must_use]
    pub fn with_cost(mut self, cost: u64) -> Self {
        self.cost = cost;
        self
    }

    /// Attach a session hash.
    #[must_use]
    pub fn with_session(mut self, hash: impl Into<String>) -> Self {
        self.session_hash = Some(hash.into());
        self
    }
}

/// Outcome of a consume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaDecision {
    /// Whether the consume was accepted.
    pub allowed: bool,
    /// Why it was refused.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenialReason>,
    /// Units the principal has left today.
    pub remaining_principal: u64,
    /// Units left under the global ceiling today.
    pub remaining_global: u64,
    /// Next UTC midnight.
    pub reset_at: DateTime<Utc>,
}

/// Usage of one principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrincipalUsage {
    /// Principal identifier.
    pub principal_id: String,
    /// Units used today.
    pub used: u64,
}

/// Usage snapshot for one principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatus {
    /// Principal identifier.
    pub principal_id: String,
    /// Plan tier name.
    pub plan: String,
    /// Day reported.
    pub date: String,
    /// Units used today.
    pub used: u64,
    /// The plan's daily limit.
    pub daily_limit: u64,
    /// Units left today.
    pub remaining: u64,
    /// Units used globally today.
    pub global_used: u64,
    /// Hard global ceiling.
    pub global_ceiling: u64,
    /// Next UTC midnight.
    pub reset_at: DateTime<Utc>,
}

/// Global usage for the current day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaSummary {
    /// Day reported.
    pub date: String,
    /// Units used globally today.
    pub global_used: u64,
    /// Hard global ceiling.
    pub global_ceiling: u64,
    /// Distinct session hashes recorded today.
    pub unique_sessions: usize,
    /// Heaviest principals today.
    pub top_principals: Vec<PrincipalUsage>,
    /// Next UTC midnight.
    pub reset_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Daily quota tracker over a [`DocumentStore`].
#[derive(Clone)]
pub struct QuotaTracker {
    store: Arc<dyn DocumentStore>,
    config: Arc<QuotaConfig>,
    clock: SharedClock,
    collection: String,
}

impl fmt::Debug for QuotaTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuotaTracker")
            .field("config", &self.config)
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

impl QuotaTracker {
    /// Create a tracker on the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::InvalidPlan`] if the configuration is
    /// inconsistent.
    pub fn new(store: Arc<dyn DocumentStore>, config: QuotaConfig) -> AdmissionResult<Self> {
        Self::with_clock(store, config, SystemClock::shared())
    }

    /// Create a tracker with an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::InvalidPlan`] if the configuration is
    /// inconsistent.
    pub fn with_clock(
        store: Arc<dyn DocumentStore>,
        config: QuotaConfig,
        clock: SharedClock,
    ) -> AdmissionResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config: Arc::new(config),
            clock,
            collection: QUOTA_COLLECTION.to_string(),
        })
    }

    /// Store quota days in a different collection.
    #[must_use]
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    /// Load the live day document. A stored day other than `today` reads as
    /// empty; the stored day is returned separately so it can be archived.
    async fn load_today(&self, today: &str) -> AdmissionResult<(QuotaDay, Option<u64>, Option<QuotaDay>)> {
        match self.store.get(&self.collection, CURRENT_DAY_ID).await? {
            None => Ok((QuotaDay::new(today), None, None)),
            Some(doc) => {
                let stored: QuotaDay = doc.decode()?;
                if stored.date == today {
                    Ok((stored, Some(doc.version), None))
                } else {
                    Ok((QuotaDay::new(today), Some(doc.version), Some(stored)))
                }
            },
        }
    }

    /// Consume quota.
    ///
    /// Denials are returned as decisions with `allowed: false`; usage
    /// counters are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::UnknownPlan`] for an unconfigured tier,
    /// [`AdmissionError::InvalidRequest`] for an empty principal,
    /// [`AdmissionError::Contention`] when concurrent writers keep winning,
    /// and propagates store failures.
    pub async fn consume(&self, request: &ConsumeRequest) -> AdmissionResult<QuotaDecision> {
        if request.principal_id.is_empty() {
            return Err(AdmissionError::InvalidRequest(
                "principalId must not be empty".into(),
            ));
        }
        let plan = self.config.plan(&request.plan)?;
        let now = self.clock.now();
        let today = utc_day(now);
        let reset_at = next_utc_midnight(now);

        for attempt in 1..=MAX_ATTEMPTS {
            let (mut day, version, superseded) = self.load_today(&today).await?;
            let (reason, changed) = day.apply(request, plan, &self.config);

            if let Some(old) = &superseded {
                self.archive(old).await?;
            }
            if changed || superseded.is_some() {
                let written = self
                    .store
                    .put_if_version(&self.collection, CURRENT_DAY_ID, version, encode_fields(&day)?)
                    .await?;
                if !written {
                    tracing::debug!(attempt, date = %today, "Quota day changed underneath, retrying");
                    continue;
                }
            }

            let decision = QuotaDecision {
                allowed: reason.is_none(),
                reason,
                remaining_principal: plan
                    .daily_limit
                    .saturating_sub(day.used_by(&request.principal_id)),
                remaining_global: self.config.global_ceiling.saturating_sub(day.global_used),
                reset_at,
            };
            match reason {
                None => tracing::debug!(
                    principal = %request.principal_id,
                    cost = request.cost,
                    remaining = decision.remaining_principal,
                    "Quota consumed"
                ),
                Some(reason) => tracing::info!(
                    principal = %request.principal_id,
                    plan = %request.plan,
                    %reason,
                    "Quota denied"
                ),
            }
            return Ok(decision);
        }

        tracing::warn!(date = %today, attempts = MAX_ATTEMPTS, "Quota update abandoned under contention");
        Err(AdmissionError::Contention {
            date: today,
            attempts: MAX_ATTEMPTS,
        })
    }

    /// Write a superseded day once under its date. Another instance may
    /// already have done so.
    async fn archive(&self, day: &QuotaDay) -> AdmissionResult<()> {
        let fields = encode_fields(day)?;
        match self.store.create(&self.collection, Some(&day.date), fields).await {
            Ok(_) => {
                tracing::info!(date = %day.date, global_used = day.global_used, "Archived quota day");
                Ok(())
            },
            Err(StorageError::AlreadyExists { .. }) => {
                tracing::debug!(date = %day.date, "Quota day already archived");
                Ok(())
            },
            Err(e) => {
                tracing::warn!(date = %day.date, error = %e, "Failed to archive quota day");
                Err(e.into())
            },
        }
    }

    /// Usage for one principal today. Pure read.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::UnknownPlan`] for an unconfigured tier and
    /// propagates store failures.
    pub async fn status(&self, principal_id: &str, plan_name: &str) -> AdmissionResult<QuotaStatus> {
        let plan = self.config.plan(plan_name)?;
        let now = self.clock.now();
        let today = utc_day(now);
        let (day, _, _) = self.load_today(&today).await?;
        let used = day.used_by(principal_id);
        Ok(QuotaStatus {
            principal_id: principal_id.to_string(),
            plan: plan_name.to_string(),
            date: today,
            used,
            daily_limit: plan.daily_limit,
            remaining: plan.daily_limit.saturating_sub(used),
            global_used: day.global_used,
            global_ceiling: self.config.global_ceiling,
            reset_at: next_utc_midnight(now),
        })
    }

    /// Global usage and the heaviest principals today. Pure read.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn summary(&self) -> AdmissionResult<QuotaSummary> {
        let now = self.clock.now();
        let today = utc_day(now);
        let (day, _, _) = self.load_today(&today).await?;
        Ok(QuotaSummary {
            top_principals: day.top_principals(self.config.top_principals),
            global_used: day.global_used,
            global_ceiling: self.config.global_ceiling,
            unique_sessions: day.session_set.len(),
            date: today,
            reset_at: next_utc_midnight(now),
        })
    }

    /// An archived day, if one was written for `date`.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn snapshot(&self, date: &str) -> AdmissionResult<Option<QuotaDay>> {
        if date == CURRENT_DAY_ID {
            return Ok(None);
        }
        match self.store.get(&self.collection, date).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }
}
