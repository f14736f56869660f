use chrono::{DateTime, Utc};

/// Time source injected into the breaker.
///
/// Phase timing is pure arithmetic over this clock, so tests can drive it
/// manually instead of sleeping through broken-state durations.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time; the production clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
