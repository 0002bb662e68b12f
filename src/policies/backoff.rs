//! # Backoff policy for retrying a failed asset.
//!
//! [`BackoffPolicy`] controls how the delay before the next start attempt
//! grows after repeated failures of the same queue entry. The delay for
//! attempt `n` (1-based, matching the entry's retry counter) is
//! `first × factor^(n-1)`, clamped to `max`, then jitter is applied.
//!
//! The base delay is derived purely from the attempt number; jitter output is
//! never fed back into subsequent calculations.

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Retry backoff policy.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub first: Duration,
    /// Maximum delay cap.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
    /// Jitter applied to the clamped base delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Returns a policy with `first = 1s`, `max = 30s`, `factor = 2.0`,
    /// no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_secs(1),
            max: Duration::from_secs(30),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Computes the delay before the given attempt (1-based).
    ///
    /// Attempt 1 uses `first`; each further attempt multiplies by `factor`,
    /// clamped to [`BackoffPolicy::max`]. Non-finite or overflowing bases
    /// clamp to `max`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let max_secs = self.max.as_secs_f64();
        let unclamped = self.first.as_secs_f64() * self.factor.powi(exponent);

        let base = if !unclamped.is_finite() || unclamped < 0.0 || unclamped > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(unclamped)
        };

        self.jitter.apply(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(first_ms: u64, max_secs: u64, factor: f64) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(first_ms),
            max: Duration::from_secs(max_secs),
            factor,
            jitter: JitterPolicy::None,
        }
    }

    #[test]
    fn test_first_attempt_uses_first_delay() {
        assert_eq!(plain(100, 30, 2.0).delay_for(1), Duration::from_millis(100));
    }

    #[test]
    fn test_exponential_growth() {
        let policy = plain(100, 30, 2.0);
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(800));
    }

    #[test]
    fn test_constant_factor_stays_flat() {
        let policy = plain(500, 30, 1.0);
        for attempt in 1..10 {
            assert_eq!(policy.delay_for(attempt), Duration::from_millis(500));
        }
    }

    #[test]
    fn test_clamped_to_max() {
        assert_eq!(plain(100, 1, 2.0).delay_for(20), Duration::from_secs(1));
    }

    #[test]
    fn test_first_exceeding_max_clamps() {
        let policy = BackoffPolicy {
            first: Duration::from_secs(10),
            max: Duration::from_secs(5),
            factor: 2.0,
            jitter: JitterPolicy::None,
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(5));
    }

    #[test]
    fn test_huge_attempt_clamps_to_max() {
        assert_eq!(plain(100, 60, 2.0).delay_for(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_attempt_zero_behaves_like_first() {
        // Attempt numbers are 1-based; 0 is tolerated, not special-cased.
        assert_eq!(plain(100, 30, 2.0).delay_for(0), Duration::from_millis(100));
    }

    #[test]
    fn test_full_jitter_bounded_by_base() {
        let policy = BackoffPolicy {
            first: Duration::from_millis(1000),
            max: Duration::from_secs(30),
            factor: 1.0,
            jitter: JitterPolicy::Full,
        };
        for attempt in 1..50 {
            assert!(policy.delay_for(attempt) <= Duration::from_millis(1000));
        }
    }

    #[test]
    fn test_equal_jitter_bounds() {
        let policy = BackoffPolicy {
            first: Duration::from_millis(1000),
            max: Duration::from_secs(30),
            factor: 1.0,
            jitter: JitterPolicy::Equal,
        };
        for attempt in 1..50 {
            let delay = policy.delay_for(attempt);
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(1000));
        }
    }
}
