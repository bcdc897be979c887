//! Exponential reconnect backoff with a hard attempt budget.

use std::time::Duration;

/// `min(base · 2ⁿ, cap)` for up to `max_attempts` attempts.
#[derive(Debug)]
pub struct ReconnectBackoff {
    attempt: u32,
    base: Duration,
    cap: Duration,
    max_attempts: u32,
}

impl ReconnectBackoff {
    /// Creates a backoff schedule.
    pub fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            base,
            cap,
            max_attempts,
        }
    }

    /// Next delay, or `None` when the budget is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let factor = 1u32.checked_shl(self.attempt).unwrap_or(u32::MAX);
        let delay = self.base.saturating_mul(factor).min(self.cap);
        self.attempt += 1;
        Some(delay)
    }

    /// Attempts consumed so far.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Resets the schedule (the socket opened).
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_up_to_the_cap_then_exhausts() {
        let mut backoff = ReconnectBackoff::new(
            Duration::from_secs(1),
            Duration::from_secs(30),
            5,
        );

        let delays: Vec<_> = std::iter::from_fn(|| backoff.next_delay()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(16),
            ]
        );
        assert_eq!(backoff.next_delay(), None);
    }

    #[test]
    fn cap_bounds_the_delay() {
        let mut backoff = ReconnectBackoff::new(
            Duration::from_secs(10),
            Duration::from_secs(30),
            5,
        );
        backoff.next_delay();
        backoff.next_delay();
        // 10 · 2² = 40 clamps to 30.
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn reset_restores_the_budget() {
        let mut backoff = ReconnectBackoff::new(
            Duration::from_secs(1),
            Duration::from_secs(30),
            2,
        );
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.next_delay(), None);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(1)));
    }
}
