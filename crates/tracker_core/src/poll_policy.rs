use std::time::Duration;

/// How often the polling channel fetches snapshots.
///
/// The period scales with the operation's age: freshly started operations are
/// polled at `fast_period` until `fast_window` has elapsed, after which the
/// coarse `slow_period` applies so long-lived monitoring does not load the
/// operation store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub fast_period: Duration,
    pub slow_period: Duration,
    pub fast_window: Duration,
    /// Consecutive transport failures tolerated before the session is
    /// presented as failed.
    pub max_consecutive_failures: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            fast_period: Duration::from_secs(2),
            slow_period: Duration::from_secs(15),
            fast_window: Duration::from_secs(60),
            max_consecutive_failures: 5,
        }
    }
}

impl PollPolicy {
    pub fn period_for(&self, age: Duration) -> Duration {
        if age < self.fast_window {
            self.fast_period
        } else {
            self.slow_period
        }
    }

    /// Age assumed for a resumed operation whose start time is unknown.
    pub fn long_lived_age(&self) -> Duration {
        self.fast_window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_switches_at_fast_window() {
        let policy = PollPolicy::default();
        assert_eq!(policy.period_for(Duration::ZERO), Duration::from_secs(2));
        assert_eq!(policy.period_for(Duration::from_secs(59)), Duration::from_secs(2));
        assert_eq!(policy.period_for(Duration::from_secs(60)), Duration::from_secs(15));
        assert_eq!(
            policy.period_for(policy.long_lived_age()),
            policy.slow_period
        );
    }
}
