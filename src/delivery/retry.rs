//! Retry policy shared by the delivery worker and the manual notifier

use std::time::Duration;

use crate::config::DeliveryConfig;

/// Wait applied after an ordinary (non flood-control) failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `min(base * attempt, cap)`
    Linear { base: Duration, cap: Duration },
    Fixed(Duration),
}

/// Bounded retry with flood-control awareness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per item, including the first one
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Added on top of the server supplied flood-control wait
    pub flood_padding: Duration,
}

impl RetryPolicy {
    /// Policy used by the queue worker
    pub fn worker(config: &DeliveryConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            backoff: Backoff::Linear {
                base: Duration::from_secs(config.retry_base_delay_secs),
                cap: Duration::from_secs(config.retry_max_delay_secs),
            },
            flood_padding: Duration::from_secs(config.flood_padding_secs),
        }
    }

    /// Policy used by direct notifications
    pub fn notifier(config: &DeliveryConfig, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Fixed(Duration::from_secs(config.notify_retry_delay_secs)),
            flood_padding: Duration::from_secs(config.flood_padding_secs),
        }
    }

    /// Wait after the 1-based `attempt` failed without a server hint
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Linear { base, cap } => base.saturating_mul(attempt).min(cap),
            Backoff::Fixed(delay) => delay,
        }
    }

    /// Wait after a flood-control response
    pub fn flood_delay(&self, retry_after: Duration) -> Duration {
        retry_after.saturating_add(self.flood_padding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_backoff_is_linear_and_capped() {
        let policy = RetryPolicy::worker(&DeliveryConfig::default());

        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(21));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(42));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(60));
        assert_eq!(policy.backoff_delay(10), Duration::from_secs(60));
    }

    #[test]
    fn test_flood_delay_adds_padding() {
        let policy = RetryPolicy::worker(&DeliveryConfig::default());
        assert_eq!(
            policy.flood_delay(Duration::from_secs(10)),
            Duration::from_secs(12)
        );
    }

    #[test]
    fn test_flood_delay_saturates() {
        let policy = RetryPolicy::worker(&DeliveryConfig::default());
        assert_eq!(policy.flood_delay(Duration::MAX), Duration::MAX);
    }

    #[test]
    fn test_notifier_backoff_is_fixed() {
        let policy = RetryPolicy::notifier(&DeliveryConfig::default(), 5);
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(5));
        assert_eq!(policy.backoff_delay(4), Duration::from_secs(5));
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let policy = RetryPolicy::notifier(&DeliveryConfig::default(), 0);
        assert_eq!(policy.max_attempts, 1);
    }
}
