//! Retry delay policy

use std::time::Duration;

use rand::Rng;

/// Exponential backoff with optional jitter.
///
/// `delay(n) = min(interval * multiplier^n * (1 + jitter * U[0,1)), max)`.
/// A multiplier of 1 and no jitter gives a fixed interval.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Fraction of the delay added at random, in `[0, 1]`
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            multiplier: 1.0,
            max_delay: Duration::from_secs(30),
            jitter: 0.0,
        }
    }
}

impl BackoffPolicy {
    pub fn fixed() -> Self {
        Self::default()
    }

    /// Delay to wait after failed attempt number `attempt` (0-based)
    pub fn delay(&self, interval: Duration, attempt: u32) -> Duration {
        self.delay_with(interval, attempt, rand::thread_rng().gen::<f64>())
    }

    fn delay_with(&self, interval: Duration, attempt: u32, unit: f64) -> Duration {
        if interval.is_zero() {
            return Duration::ZERO;
        }

        let multiplier = self.multiplier.max(1.0);
        let jitter = self.jitter.clamp(0.0, 1.0);
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = interval.as_secs_f64() * multiplier.powi(exponent) * (1.0 + jitter * unit);

        let max = self.max_delay.max(interval);
        if !scaled.is_finite() || scaled >= max.as_secs_f64() {
            max
        } else {
            Duration::from_secs_f64(scaled)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_interval_by_default() {
        let policy = BackoffPolicy::fixed();
        let interval = Duration::from_millis(250);
        for attempt in 0..5 {
            assert_eq!(policy.delay(interval, attempt), interval);
        }
    }

    #[test]
    fn test_exponential_growth_is_capped() {
        let policy = BackoffPolicy {
            multiplier: 2.0,
            max_delay: Duration::from_secs(1),
            jitter: 0.0,
        };
        let interval = Duration::from_millis(100);
        assert_eq!(policy.delay(interval, 0), Duration::from_millis(100));
        assert_eq!(policy.delay(interval, 1), Duration::from_millis(200));
        assert_eq!(policy.delay(interval, 3), Duration::from_millis(800));
        assert_eq!(policy.delay(interval, 4), Duration::from_secs(1));
        assert_eq!(policy.delay(interval, u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let policy = BackoffPolicy {
            multiplier: 1.0,
            max_delay: Duration::from_secs(10),
            jitter: 0.5,
        };
        let interval = Duration::from_millis(100);
        assert_eq!(policy.delay_with(interval, 0, 0.0), interval);
        assert_eq!(policy.delay_with(interval, 0, 1.0), Duration::from_millis(150));
        for _ in 0..50 {
            let delay = policy.delay(interval, 0);
            assert!(delay >= interval && delay <= Duration::from_millis(150));
        }
    }

    #[test]
    fn test_zero_interval_never_sleeps() {
        let policy = BackoffPolicy {
            multiplier: 3.0,
            max_delay: Duration::from_secs(5),
            jitter: 1.0,
        };
        assert_eq!(policy.delay(Duration::ZERO, 7), Duration::ZERO);
    }
}
