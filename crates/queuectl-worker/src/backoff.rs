//! Retry delay and dead-letter policy.

use chrono::Duration;

/// Longest delay a single retry may be pushed out by.
pub const MAX_DELAY_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Exponential backoff: the k-th failure delays the next attempt by `base^k`
/// seconds, and a job whose failures exceed its `max_retries` is dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: u32,
}

impl BackoffPolicy {
    /// Create a policy with the given base. A base of 0 is treated as 1.
    pub fn new(base: u32) -> Self {
        Self { base: base.max(1) }
    }

    /// Delay before the next attempt after `attempts` failures.
    pub fn delay_for(&self, attempts: i32) -> Duration {
        let exponent = attempts.max(0) as u32;
        let seconds = u64::from(self.base)
            .checked_pow(exponent)
            .map_or(MAX_DELAY_SECONDS, |s| s.min(MAX_DELAY_SECONDS as u64) as i64);
        Duration::seconds(seconds)
    }

    /// Whether a job with `attempts` failures has exhausted `max_retries`.
    pub fn should_dead_letter(&self, attempts: i32, max_retries: i32) -> bool {
        attempts > max_retries
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_grows_exponentially() {
        let policy = BackoffPolicy::new(2);
        assert_eq!(policy.delay_for(1), Duration::seconds(2));
        assert_eq!(policy.delay_for(2), Duration::seconds(4));
        assert_eq!(policy.delay_for(3), Duration::seconds(8));

        let policy = BackoffPolicy::new(3);
        assert_eq!(policy.delay_for(2), Duration::seconds(9));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = BackoffPolicy::new(10);
        assert_eq!(policy.delay_for(40), Duration::seconds(MAX_DELAY_SECONDS));
        assert_eq!(policy.delay_for(7), Duration::seconds(MAX_DELAY_SECONDS));
    }

    #[test]
    fn test_dead_letter_threshold() {
        let policy = BackoffPolicy::default();
        assert!(!policy.should_dead_letter(0, 0));
        assert!(policy.should_dead_letter(1, 0));
        assert!(!policy.should_dead_letter(3, 3));
        assert!(policy.should_dead_letter(4, 3));
    }

    #[test]
    fn test_zero_base_is_clamped() {
        assert_eq!(BackoffPolicy::new(0), BackoffPolicy::new(1));
        assert_eq!(BackoffPolicy::new(0).delay_for(5), Duration::seconds(1));
    }
}
