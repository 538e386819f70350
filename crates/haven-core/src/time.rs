//! Timestamps and clocks.
//!
//! `Timestamp` is milliseconds since the Unix epoch. The zero value means
//! "unset" and is never produced by a working clock.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Timestamp in milliseconds since Unix epoch.
///
/// Used for:
/// - Object modification times (`Envelope::modified`)
/// - Peer heartbeats (`Peer::last_heartbeat`)
/// - Registration expiry in the peer directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Creates a new timestamp from milliseconds since Unix epoch.
    pub const fn new(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the current wall-clock time.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now()).unwrap_or_default()
    }

    /// Returns the milliseconds since Unix epoch.
    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// Returns true for the unset timestamp.
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Creates from a SystemTime.
    pub fn from_system_time(time: SystemTime) -> Option<Self> {
        time.duration_since(UNIX_EPOCH)
            .ok()
            .map(|d| Self(duration_millis(d)))
    }

    /// Converts to a SystemTime.
    pub fn to_system_time(&self) -> Option<SystemTime> {
        if self.0 >= 0 {
            UNIX_EPOCH.checked_add(Duration::from_millis(self.0 as u64))
        } else {
            UNIX_EPOCH.checked_sub(Duration::from_millis((-self.0) as u64))
        }
    }

    /// Adds a duration to this timestamp.
    pub fn add(&self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration_millis(duration)))
    }

    /// Subtracts a duration from this timestamp.
    pub fn sub(&self, duration: Duration) -> Self {
        Self(self.0.saturating_sub(duration_millis(duration)))
    }

    /// Returns the duration between two timestamps.
    pub fn duration_since(&self, earlier: &Timestamp) -> Option<Duration> {
        if self.0 >= earlier.0 {
            Some(Duration::from_millis((self.0 - earlier.0) as u64))
        } else {
            None
        }
    }

    /// Returns true if this timestamp is strictly after `other`.
    pub fn is_after(&self, other: &Timestamp) -> bool {
        self.0 > other.0
    }
}

/// Whole milliseconds in `duration`, clamped to `i64::MAX`.
fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(time) = self.to_system_time() {
            write!(f, "{:?}", time)
        } else {
            write!(f, "{}ms", self.0)
        }
    }
}

impl From<i64> for Timestamp {
    fn from(millis: i64) -> Self {
        Self(millis)
    }
}

/// Source of the current time.
///
/// The engine reads every heartbeat, liveness and age decision through a
/// clock so tests can move time forward without sleeping.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start.0)),
        }
    }

    /// Creates a clock frozen at the current wall-clock time.
    pub fn starting_now() -> Self {
        Self::new(Timestamp::now())
    }

    /// Moves the clock forward.
    pub fn advance(&self, duration: Duration) {
        let step = duration_millis(duration);
        let _ = self
            .millis
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |millis| {
                Some(millis.saturating_add(step))
            });
    }

    /// Sets the clock to an absolute time.
    pub fn set(&self, time: Timestamp) {
        self.millis.store(time.0, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.millis.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_now() {
        let ts = Timestamp::now();
        // Should be after 2024-01-01
        assert!(ts.0 > 1704067200000);
        assert!(!ts.is_zero());
    }

    #[test]
    fn test_timestamp_arithmetic() {
        let ts = Timestamp::new(1000000);
        let duration = Duration::from_millis(5000);

        assert_eq!(ts.add(duration).0, 1005000);
        assert_eq!(ts.sub(duration).0, 995000);
    }

    #[test]
    fn test_arithmetic_saturates_on_huge_durations() {
        let ts = Timestamp::new(1_700_000_000_000);
        let huge = Duration::from_secs(u64::MAX / 1000);

        assert_eq!(ts.add(huge), Timestamp::new(i64::MAX));
        assert!(ts.add(huge).is_after(&ts));
        assert_eq!(ts.sub(huge), Timestamp::new(1_700_000_000_000 - i64::MAX));
        assert_eq!(ts.add(Duration::MAX), Timestamp::new(i64::MAX));
    }

    #[test]
    fn test_duration_since() {
        let earlier = Timestamp::new(1000000);
        let later = Timestamp::new(1005000);

        let duration = later.duration_since(&earlier).unwrap();
        assert_eq!(duration.as_millis(), 5000);
        assert!(earlier.duration_since(&later).is_none());
    }

    #[test]
    fn test_system_time_roundtrip() {
        let ts = Timestamp::new(1700000000000);
        let time = ts.to_system_time().unwrap();
        assert_eq!(Timestamp::from_system_time(time), Some(ts));
    }

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new(Timestamp::new(1000));
        let other = clock.clone();

        clock.advance(Duration::from_secs(2));
        assert_eq!(other.now(), Timestamp::new(3000));

        other.set(Timestamp::new(10));
        assert_eq!(clock.now(), Timestamp::new(10));
    }

    #[test]
    fn test_manual_clock_saturates() {
        let clock = ManualClock::new(Timestamp::new(1000));
        clock.advance(Duration::MAX);
        assert_eq!(clock.now(), Timestamp::new(i64::MAX));

        clock.advance(Duration::from_secs(1));
        assert_eq!(clock.now(), Timestamp::new(i64::MAX));
    }
}
