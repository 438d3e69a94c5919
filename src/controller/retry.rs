//! Whole-run retry policy.

use std::time::Duration;

use crate::config::CrawlSettings;

/// How often, and how far apart, a failed crawl is restarted from scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn from_settings(settings: &CrawlSettings) -> Self {
        Self::new(settings.max_attempts, settings.retry_backoff())
    }

    /// Whether another attempt follows attempt number `attempt` (1-based).
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_bounds() {
        let policy = RetryPolicy::default();
        assert!(policy.allows_retry_after(1));
        assert!(policy.allows_retry_after(2));
        assert!(!policy.allows_retry_after(3));

        let once = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(once.max_attempts, 1);
        assert!(!once.allows_retry_after(1));
    }

    #[test]
    fn test_policy_from_settings() {
        let policy = RetryPolicy::from_settings(&CrawlSettings::default());
        assert_eq!(policy, RetryPolicy::default());
    }
}
