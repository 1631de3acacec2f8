use tokio::time::{Duration, Instant};

use crate::config::proc_initiator::{
    POLL_INITIAL_DELAY_MS_DEFAULT, POLL_MAX_DELAY_MS_DEFAULT, POLL_TIMEOUT_SECONDS_DEFAULT,
};
use crate::config::upstream::PollConfig;

/// Bounded exponential backoff for job polling: the delay doubles from
/// `initial_delay` up to `max_delay`, and polling stops at `timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(POLL_INITIAL_DELAY_MS_DEFAULT),
            max_delay: Duration::from_millis(POLL_MAX_DELAY_MS_DEFAULT),
            timeout: Duration::from_secs(POLL_TIMEOUT_SECONDS_DEFAULT),
        }
    }
}

impl PollPolicy {
    pub fn from_config(poll: Option<&PollConfig>) -> Self {
        let default = Self::default();
        let initial_delay = poll
            .and_then(|p| p.initial_delay_ms)
            .map(Duration::from_millis)
            .unwrap_or(default.initial_delay);
        let max_delay = poll
            .and_then(|p| p.max_delay_ms)
            .map(Duration::from_millis)
            .unwrap_or(default.max_delay)
            .max(initial_delay);
        let timeout = poll
            .and_then(|p| p.timeout_seconds)
            .map(Duration::from_secs)
            .unwrap_or(default.timeout);
        Self { initial_delay, max_delay, timeout }
    }

    /// Start the clock for one job
    pub fn start(&self) -> PollSchedule {
        PollSchedule {
            next_delay: self.initial_delay,
            max_delay: self.max_delay,
            deadline: Instant::now() + self.timeout,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollSchedule {
    next_delay: Duration,
    max_delay: Duration,
    deadline: Instant,
}

impl PollSchedule {
    /// Delay before the next status check, shortened to fit the deadline.
    /// `None` once the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return None;
        }
        let delay = self.next_delay.min(remaining);
        self.next_delay = (self.next_delay * 2).min(self.max_delay);
        Some(delay)
    }
}
