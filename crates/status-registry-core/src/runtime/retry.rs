// crates/status-registry-core/src/runtime/retry.rs
// ============================================================================
// Module: Retry Policy
// Description: Bounded exponential backoff with jitter.
// Purpose: Retry conflicts and transient failures without unbounded waits.
// Dependencies: rand, serde
// ============================================================================

//! ## Overview
//! Both allocation conflicts and publisher outages are retried a bounded number
//! of times. Delays double per attempt, are capped, and are jittered into the
//! upper half of the window so racing writers spread out.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Retry Policy
// ============================================================================

/// Bounded retry schedule.
///
/// # Invariants
/// - `max_attempts >= 1` counts the first try.
/// - `base_delay_ms <= max_delay_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt (milliseconds).
    pub base_delay_ms: u64,
    /// Upper bound for any single delay (milliseconds).
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 10,
            max_delay_ms: 200,
        }
    }
}

impl RetryPolicy {
    /// Returns a policy that never retries.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Returns true when another attempt is allowed after `attempt` tries.
    #[must_use]
    pub const fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Returns the jittered delay to wait after failed attempt `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let ceiling = self.base_delay_ms.saturating_mul(1_u64 << exponent).min(self.max_delay_ms);
        if ceiling == 0 {
            return Duration::ZERO;
        }
        let floor = ceiling / 2;
        Duration::from_millis(rand::thread_rng().gen_range(floor ..= ceiling))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::RetryPolicy;

    #[test]
    fn delays_double_and_cap() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay_ms: 8,
            max_delay_ms: 40,
        };
        for _ in 0 .. 32 {
            let first = policy.delay_after(1);
            assert!(first >= Duration::from_millis(4) && first <= Duration::from_millis(8));
            let third = policy.delay_after(3);
            assert!(third >= Duration::from_millis(16) && third <= Duration::from_millis(32));
            assert!(policy.delay_after(9) <= Duration::from_millis(40));
        }
    }

    #[test]
    fn no_retry_policy_stops_after_first_attempt() {
        let policy = RetryPolicy::no_retry();
        assert!(!policy.allows_retry(1));
        assert_eq!(policy.delay_after(1), Duration::ZERO);
    }
}
