//! Reconnect backoff policy

use std::time::Duration;

/// Exponential backoff state for the connection task.
///
/// Every recorded failure increments the attempt counter. While the
/// counter stays at or below the maximum, [`record_failure`] yields the
/// delay before the next attempt: `base_delay * 2^(attempts - 1)`. Once
/// the counter passes the maximum the policy is exhausted and the
/// connection is failed until a manual reset.
///
/// [`record_failure`]: ReconnectPolicy::record_failure
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    base_delay: Duration,
    max_attempts: u32,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
            attempts: 0,
        }
    }

    /// Records one close/failed-open and returns the delay before the
    /// next attempt, or `None` when retries are exhausted.
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.attempts += 1;
        if self.attempts > self.max_attempts {
            return None;
        }
        Some(self.base_delay * 2u32.pow(self.attempts - 1))
    }

    /// Called on successful open and on manual `connect()`.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Pins the counter at the maximum so the next failure reports
    /// exhaustion. Used by explicit disconnect.
    pub fn exhaust(&mut self) {
        self.attempts = self.max_attempts;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_per_attempt() {
        let mut policy = ReconnectPolicy::new(Duration::from_millis(1000), 5);

        let delays: Vec<_> = (0..5).map(|_| policy.record_failure().unwrap()).collect();
        assert_eq!(
            delays,
            [
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000),
                Duration::from_millis(8000),
                Duration::from_millis(16000),
            ]
        );

        // the sixth consecutive failure exhausts the policy
        assert_eq!(policy.record_failure(), None);
        assert!(policy.is_exhausted());
    }

    #[test]
    fn counter_increments_once_per_failure() {
        let mut policy = ReconnectPolicy::new(Duration::from_millis(10), 5);
        policy.record_failure();
        policy.record_failure();
        assert_eq!(policy.attempts(), 2);
    }

    #[test]
    fn reset_starts_a_fresh_cycle() {
        let mut policy = ReconnectPolicy::new(Duration::from_millis(1000), 5);
        for _ in 0..5 {
            policy.record_failure();
        }
        policy.reset();
        assert_eq!(policy.attempts(), 0);
        assert_eq!(policy.record_failure(), Some(Duration::from_millis(1000)));
    }

    #[test]
    fn exhaust_blocks_further_attempts() {
        let mut policy = ReconnectPolicy::new(Duration::from_millis(1000), 5);
        policy.exhaust();
        assert_eq!(policy.record_failure(), None);
    }
}
