//! Reconnection Policy
//!
//! Bounded retry budget with a fixed interval between attempts. The budget
//! counts consecutive failures and is restored once a connection opens.

use std::time::Duration;

use rand::Rng;

/// Default number of consecutive reconnection attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default pause between reconnection attempts.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(3000);

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Pause before each reconnection attempt.
    pub interval: Duration,
    /// Maximum consecutive attempts before giving up (0 = unlimited).
    pub max_attempts: u32,
    /// Jitter as a fraction of the interval (0.1 = ±10%). Zero disables it.
    pub jitter_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::fixed(DEFAULT_INTERVAL, DEFAULT_MAX_ATTEMPTS)
    }
}

impl ReconnectConfig {
    /// Fixed interval without jitter.
    #[must_use]
    pub const fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
            jitter_factor: 0.0,
        }
    }

    /// Same configuration with jitter applied to every delay.
    #[must_use]
    pub const fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor;
        self
    }
}

/// Reconnection policy with a fixed interval and bounded attempts.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use trade_tape::infrastructure::feed::reconnect::{ReconnectConfig, ReconnectPolicy};
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::fixed(Duration::from_millis(10), 2));
///
/// assert_eq!(policy.next_delay(), Some(Duration::from_millis(10)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_millis(10)));
/// assert_eq!(policy.next_delay(), None);
///
/// // A successful connection restores the budget.
/// policy.reset();
/// assert!(policy.should_retry());
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Delay before the next attempt, or `None` once the budget is spent.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }

        self.attempt_count += 1;
        Some(self.apply_jitter(self.config.interval))
    }

    /// Restore the full budget after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Attempts made since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Configured attempt budget (0 = unlimited).
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Whether another attempt is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let jitter: f64 = rand::rng().random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_five_attempts_every_three_seconds() {
        let config = ReconnectConfig::default();
        assert_eq!(config.interval, Duration::from_millis(3000));
        assert_eq!(config.max_attempts, 5);
        assert!(config.jitter_factor.abs() < f64::EPSILON);
    }

    #[test]
    fn interval_is_constant() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::fixed(Duration::from_millis(250), 0));

        for _ in 0..10 {
            assert_eq!(policy.next_delay(), Some(Duration::from_millis(250)));
        }
    }

    #[test]
    fn budget_is_bounded() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());

        for attempt in 1..=5 {
            assert!(policy.next_delay().is_some());
            assert_eq!(policy.attempt_count(), attempt);
        }

        assert!(policy.next_delay().is_none());
        assert!(!policy.should_retry());
        assert_eq!(policy.attempt_count(), 5);
    }

    #[test]
    fn reset_restores_budget() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::fixed(Duration::from_millis(1), 2));
        let _ = policy.next_delay();
        let _ = policy.next_delay();
        assert!(!policy.should_retry());

        policy.reset();

        assert_eq!(policy.attempt_count(), 0);
        assert!(policy.next_delay().is_some());
    }

    #[test]
    fn zero_attempts_means_unlimited() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::fixed(Duration::from_millis(1), 0));

        for _ in 0..1000 {
            assert!(policy.next_delay().is_some());
        }
    }

    #[test]
    fn jitter_stays_within_bounds() {
        for _ in 0..100 {
            let mut policy = ReconnectPolicy::new(
                ReconnectConfig::fixed(Duration::from_millis(1000), 0).with_jitter(0.1),
            );

            let millis = policy.next_delay().unwrap().as_millis();
            assert!(millis >= 900, "delay {millis}ms is below minimum 900ms");
            assert!(millis <= 1100, "delay {millis}ms is above maximum 1100ms");
        }
    }
}
