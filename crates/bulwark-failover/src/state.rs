//! Process-local failover flag.

use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
struct Trip {
    at: DateTime<Utc>,
    reason: String,
}

/// Sticky flag: once tripped, writes skip the primary until [`reset`]
/// is called explicitly.
///
/// Share one instance (behind an `Arc`) between every router in a process.
///
/// [`reset`]: Self::reset
#[derive(Debug, Default)]
pub struct FailoverState {
    tripped: AtomicBool,
    trip: RwLock<Option<Trip>>,
}

impl FailoverState {
    /// An untripped flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether writes currently bypass the primary.
    #[must_use]
    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }

    /// Trip the flag. Returns `true` only for the call that tripped it; the
    /// first reason and time are kept.
    pub fn trip(&self, reason: impl Into<String>, at: DateTime<Utc>) -> bool {
        let mut trip = self.trip.write().unwrap_or_else(|e| {
            tracing::warn!("Failover state lock poisoned, recovering");
            e.into_inner()
        });
        if self.tripped.swap(true, Ordering::AcqRel) {
            return false;
        }
        *trip = Some(Trip {
            at,
            reason: reason.into(),
        });
        true
    }

    /// When the flag was tripped.
    #[must_use]
    pub fn tripped_at(&self) -> Option<DateTime<Utc>> {
        self.read().map(|t| t.at)
    }

    /// What tripped the flag.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.read().map(|t| t.reason)
    }

    /// Clear the flag so the primary is tried again.
    pub fn reset(&self) {
        let mut trip = self.trip.write().unwrap_or_else(|e| {
            tracing::warn!("Failover state lock poisoned, recovering");
            e.into_inner()
        });
        *trip = None;
        self.tripped.store(false, Ordering::Release);
        tracing::info!("Failover reset, primary re-enabled");
    }

    fn read(&self) -> Option<Trip> {
        self.trip
            .read()
            .map_or_else(|e| e.into_inner().clone(), |t| t.clone())
    }
}
