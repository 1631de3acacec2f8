use chrono::{DateTime, TimeDelta, Utc};

/// Source of wall-clock time for token validity and balance staleness.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub fn now_i64() -> i64 {
    Utc::now().timestamp()
}

/// Saturates at `TimeDelta::MAX` instead of panicking on out-of-range input.
pub fn seconds(secs: u64) -> TimeDelta {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}
