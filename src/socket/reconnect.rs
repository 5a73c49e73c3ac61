//! Reconnection policy for an authenticated session whose socket dropped.
//!
//! A connection that never authenticated does not reconnect at all; that
//! failure is terminal for the attempt and surfaced to the caller. Once a
//! session has authenticated, drops are retried with a linearly escalating,
//! capped delay, up to a hard attempt bound. The counter is reset whenever a
//! socket opens again.

use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based), or `None` once the
    /// bound is exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        Some((self.base_delay * attempt).min(self.max_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_escalate_linearly_and_cap_at_five_seconds() {
        let policy = ReconnectPolicy::default();
        for n in 1..=10u32 {
            let expected = Duration::from_millis(u64::from(n * 1000).min(5000));
            assert_eq!(policy.delay_for(n), Some(expected), "attempt {n}");
        }
    }

    #[test]
    fn no_eleventh_attempt() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(11), None);
        assert_eq!(policy.delay_for(u32::MAX), None);
    }

    #[test]
    fn attempt_zero_is_not_a_retry() {
        assert_eq!(ReconnectPolicy::default().delay_for(0), None);
    }
}
