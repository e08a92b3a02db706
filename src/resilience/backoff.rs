//! Exponential backoff between retries of a downstream call.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Jitter is at most `1 / JITTER_DIVISOR` of the computed delay.
const JITTER_DIVISOR: u64 = 10;

/// Delay schedule: `base * 2^(retry - 1)`, capped at `max`, plus up to 10%
/// random jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    /// Delay without jitter before retry number `retry` (1-based).
    pub fn ceiling(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(retry - 1).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Delay with jitter before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let ceiling = self.ceiling(retry);
        let spread = ceiling.as_millis() as u64 / JITTER_DIVISOR;
        if spread == 0 {
            return ceiling;
        }
        ceiling + Duration::from_millis(rand::thread_rng().gen_range(0..spread))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff() -> Backoff {
        Backoff::new(Duration::from_millis(100), Duration::from_millis(1_000))
    }

    #[test]
    fn test_doubles_until_cap() {
        let b = backoff();
        assert_eq!(b.ceiling(0), Duration::ZERO);
        assert_eq!(b.ceiling(1), Duration::from_millis(100));
        assert_eq!(b.ceiling(2), Duration::from_millis(200));
        assert_eq!(b.ceiling(4), Duration::from_millis(800));
        assert_eq!(b.ceiling(5), Duration::from_millis(1_000));
        assert_eq!(b.ceiling(u32::MAX), Duration::from_millis(1_000));
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let b = backoff();
        for _ in 0..50 {
            let d = b.delay(2);
            assert!(d >= Duration::from_millis(200) && d < Duration::from_millis(220));
        }
    }

    #[test]
    fn test_max_never_below_base() {
        let b = Backoff::new(Duration::from_millis(500), Duration::from_millis(10));
        assert_eq!(b.ceiling(1), Duration::from_millis(500));
        assert_eq!(b.ceiling(3), Duration::from_millis(500));
    }

    #[test]
    fn test_from_config() {
        let config = RetryConfig {
            base_delay_ms: 50,
            max_delay_ms: 75,
            ..RetryConfig::default()
        };
        let b = Backoff::from_config(&config);
        assert_eq!(b.ceiling(1), Duration::from_millis(50));
        assert_eq!(b.ceiling(2), Duration::from_millis(75));
    }
}
