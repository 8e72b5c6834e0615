//! Time source abstraction.
//!
//! Business code reads time through [`Clock`] so lockups, flash sales and
//! epochs can be tested by advancing a [`ManualClock`] instead of sleeping.

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Current time as unix milliseconds, the unit stored in hashed records.
    fn now_millis(&self) -> u64 {
        self.now().timestamp_millis().max(0) as u64
    }
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    /// 2023-01-01T00:00:00Z, a fixed starting point for tests.
    pub fn at_epoch_start() -> Self {
        let start = Utc
            .timestamp_millis_opt(1_672_531_200_000)
            .single()
            .unwrap_or_else(Utc::now);
        Self::new(start)
    }

    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock();
        *current += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances_shared_instant() {
        let clock = ManualClock::at_epoch_start();
        let other = clock.clone();
        let start = clock.now();

        other.advance(Duration::hours(3));

        assert_eq!(clock.now() - start, Duration::hours(3));
        assert_eq!(clock.now_millis(), 1_672_531_200_000 + 3 * 3_600_000);
    }
}
