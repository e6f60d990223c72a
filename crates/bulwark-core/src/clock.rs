//! Injectable time sources.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, TimeZone, Utc};

/// A source of "now".
///
/// Every component that reasons about time (bucket refill, KV expiry, quota
/// day boundaries, bookkeeping timestamps) reads it through a `Clock` so
/// tests can move time explicitly.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current instant in UTC.
    fn now(&self) -> DateTime<Utc>;

    /// Current instant as milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Shared, dynamically dispatched clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Wrap a system clock in a [`SharedClock`].
    #[must_use]
    pub fn shared() -> SharedClock {
        Arc::new(Self)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Cloning shares the underlying instant, so a test can hold one handle and
/// hand another to the component under test.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    /// Create a clock frozen at the given Unix millisecond timestamp.
    ///
    /// Out-of-range timestamps fall back to the Unix epoch.
    #[must_use]
    pub fn at_ms(ms: i64) -> Self {
        let start = Utc
            .timestamp_millis_opt(ms)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        Self::new(start)
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.write().unwrap_or_else(|e| {
            tracing::warn!("ManualClock lock poisoned, recovering");
            e.into_inner()
        });
        if let Some(next) = now.checked_add_signed(delta) {
            *now = next;
        }
    }

    /// Move the clock forward by `ms` milliseconds.
    pub fn advance_ms(&self, ms: i64) {
        self.advance(Duration::milliseconds(ms));
    }

    /// Jump to an absolute instant.
    pub fn set(&self, to: DateTime<Utc>) {
        let mut now = self.now.write().unwrap_or_else(|e| {
            tracing::warn!("ManualClock lock poisoned, recovering");
            e.into_inner()
        });
        *now = to;
    }

    /// Wrap a clone of this clock in a [`SharedClock`].
    #[must_use]
    pub fn shared(&self) -> SharedClock {
        Arc::new(self.clone())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.read().map_or_else(|e| *e.into_inner(), |now| *now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::at_ms(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        clock.advance_ms(250);
        assert_eq!(clock.now_ms(), 1_250);
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::at_ms(0);
        let shared = clock.shared();
        clock.advance(Duration::seconds(2));
        assert_eq!(shared.now_ms(), 2_000);
    }

    #[test]
    fn test_manual_clock_set() {
        let clock = ManualClock::at_ms(0);
        let target = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        clock.set(target);
        assert_eq!(clock.now(), target);
    }

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock;
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }
}
