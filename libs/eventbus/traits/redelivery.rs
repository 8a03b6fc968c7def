use std::time::Duration;

/// Decides how a failed delivery is retried
///
/// Redelivery only happens while the subscription is still attached; an
/// unsubscribed handler never sees the message again.
pub trait RedeliveryPolicy: Send + Sync {
    /// Delay before redelivery attempt `attempt` (0-indexed)
    ///
    /// # Returns
    /// * `Some(duration)` - Wait this long, then redeliver
    /// * `None` - Give up on this message
    fn next_delay(&self, attempt: usize) -> Option<Duration>;
}

/// Exponential backoff: initial_delay * 2^attempt, capped at max_delay
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<usize>,
}

impl ExponentialBackoff {
    /// # Arguments
    /// * `initial_delay` - Delay before the first redelivery
    /// * `max_delay` - Upper bound for any single delay
    /// * `max_attempts` - Maximum number of redeliveries (None = unlimited)
    pub fn new(initial_delay: Duration, max_delay: Duration, max_attempts: Option<usize>) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts,
        }
    }
}

impl RedeliveryPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: usize) -> Option<Duration> {
        if self.max_attempts.is_some_and(|max| attempt >= max) {
            return None;
        }

        let factor = 2u64.saturating_pow(attempt.min(32) as u32);
        let delay = (self.initial_delay.as_millis() as u64).saturating_mul(factor);
        Some(Duration::from_millis(
            delay.min(self.max_delay.as_millis() as u64),
        ))
    }
}

/// Same delay between every redelivery
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<usize>,
}

impl FixedDelay {
    pub fn new(delay: Duration, max_attempts: Option<usize>) -> Self {
        Self { delay, max_attempts }
    }
}

impl RedeliveryPolicy for FixedDelay {
    fn next_delay(&self, attempt: usize) -> Option<Duration> {
        if self.max_attempts.is_some_and(|max| attempt >= max) {
            return None;
        }
        Some(self.delay)
    }
}

/// Failed messages are logged and dropped
#[derive(Debug, Clone, Default)]
pub struct NeverRedeliver;

impl RedeliveryPolicy for NeverRedeliver {
    fn next_delay(&self, _attempt: usize) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_sequence() {
        let policy = ExponentialBackoff::new(
            Duration::from_millis(100),
            Duration::from_secs(10),
            Some(4),
        );

        let delays: Vec<u128> = (0..4)
            .map(|i| policy.next_delay(i).unwrap().as_millis())
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800]);
        assert!(policy.next_delay(4).is_none());
    }

    #[test]
    fn test_exponential_backoff_caps() {
        let policy = ExponentialBackoff::new(Duration::from_millis(500), Duration::from_secs(1), None);

        assert_eq!(policy.next_delay(0).unwrap().as_millis(), 500);
        assert_eq!(policy.next_delay(1).unwrap().as_millis(), 1000);
        assert_eq!(policy.next_delay(5).unwrap().as_millis(), 1000);
        assert_eq!(policy.next_delay(200).unwrap().as_millis(), 1000);
    }

    #[test]
    fn test_fixed_delay_and_never() {
        let fixed = FixedDelay::new(Duration::from_millis(25), Some(2));
        assert_eq!(fixed.next_delay(0), Some(Duration::from_millis(25)));
        assert_eq!(fixed.next_delay(1), Some(Duration::from_millis(25)));
        assert_eq!(fixed.next_delay(2), None);

        assert_eq!(NeverRedeliver.next_delay(0), None);
    }
}
