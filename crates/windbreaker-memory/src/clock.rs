use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use windbreaker_core::Clock;

/// Manually advanced clock for deterministic phase-timing tests.
///
/// Cloning yields another handle onto the same instant, so a clock shared
/// between a breaker and a [`MemoryStore`](crate::MemoryStore) moves both in
/// lockstep.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now_secs: Arc<AtomicI64>,
}

impl ManualClock {
    /// Starts the clock at the given unix-second timestamp.
    #[must_use]
    pub fn at(unix_secs: i64) -> Self {
        Self {
            now_secs: Arc::new(AtomicI64::new(unix_secs)),
        }
    }

    /// Moves time forward by `secs`.
    pub fn advance(&self, secs: i64) {
        self.now_secs.fetch_add(secs, Ordering::SeqCst);
    }

    /// Jumps to an absolute unix-second timestamp.
    pub fn set(&self, unix_secs: i64) {
        self.now_secs.store(unix_secs, Ordering::SeqCst);
    }

    /// The current unix-second timestamp.
    #[must_use]
    pub fn unix_secs(&self) -> i64 {
        self.now_secs.load(Ordering::SeqCst)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.unix_secs(), 0).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_moves_shared_handles() {
        let clock = ManualClock::at(1_000);
        let other = clock.clone();

        clock.advance(21);

        assert_eq!(other.unix_secs(), 1_021);
        assert_eq!(other.now().timestamp(), 1_021);
    }
}
