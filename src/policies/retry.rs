//! # Per-asset retry budget.
//!
//! [`RetryPolicy`] bounds how many times the orchestrator automatically
//! restarts a failing queue entry before marking it terminally `failed`.
//! An entry's retry counter increments on every failed attempt (including an
//! interrupted session found at recovery); once the counter exceeds
//! `max_retries` the entry requires operator intervention.
//!
//! ## Rules
//! - `max_retries = 0` → one attempt, no automatic retry.
//! - `max_retries = 1` (default) → one attempt plus one automatic retry.
//! - Deliberate skips never consume the budget.

use std::time::Duration;

use crate::policies::BackoffPolicy;

/// Bounded automatic-retry policy for failing queue entries.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Maximum automatic retries per asset after the initial attempt.
    pub max_retries: u32,
    /// Delay computation between attempts.
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    /// One automatic retry with the default backoff.
    fn default() -> Self {
        Self {
            max_retries: 1,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl RetryPolicy {
    /// Returns whether an entry whose retry counter would become
    /// `next_retries` is still within budget.
    #[inline]
    pub fn allows(&self, next_retries: u32) -> bool {
        next_retries <= self.max_retries
    }

    /// Returns the delay to wait before the given attempt (1-based retry
    /// counter value).
    #[inline]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.delay_for(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_budget_is_one_retry() {
        let policy = RetryPolicy::default();
        assert!(policy.allows(1));
        assert!(!policy.allows(2));
    }

    #[test]
    fn test_zero_budget_forbids_retry() {
        let policy = RetryPolicy {
            max_retries: 0,
            ..RetryPolicy::default()
        };
        assert!(!policy.allows(1));
    }
}
