//! Fixed-interval retry policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry policy configuration.
///
/// `budget` is the total number of attempts (not the number of retries), so a
/// budget of 1 means a single attempt and no backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawRetryPolicy")]
pub struct RetryPolicy {
    budget: u32,
    /// Fixed delay between consecutive failed attempts.
    backoff: Duration,
}

/// Wire shape of [`RetryPolicy`]; converted through [`RetryPolicy::fixed`].
#[derive(Deserialize)]
struct RawRetryPolicy {
    budget: u32,
    backoff: Duration,
}

impl From<RawRetryPolicy> for RetryPolicy {
    fn from(raw: RawRetryPolicy) -> Self {
        RetryPolicy::fixed(raw.budget, raw.backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            budget: 3,
            backoff: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    /// Create a fixed-backoff policy. A zero budget is raised to one attempt.
    pub fn fixed(budget: u32, backoff: Duration) -> Self {
        Self {
            budget: budget.max(1),
            backoff,
        }
    }

    /// A single attempt, no backoff.
    pub fn once() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Same backoff, different budget.
    pub fn with_budget(self, budget: u32) -> Self {
        Self::fixed(budget, self.backoff)
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Whether to sleep after a failed `attempt` (1-indexed).
    ///
    /// Only true while attempts remain, so N attempts see N-1 delays.
    pub fn should_backoff(&self, attempt: u32) -> bool {
        attempt < self.budget
    }

    /// Attempt numbers this policy allows, 1-indexed.
    pub fn attempts(&self) -> core::ops::RangeInclusive<u32> {
        1..=self.budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_matches_three_attempts_three_seconds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.budget(), 3);
        assert_eq!(policy.backoff(), Duration::from_secs(3));
    }

    #[test]
    fn zero_budget_is_clamped_to_one_attempt() {
        let policy = RetryPolicy::fixed(0, Duration::from_millis(10));
        assert_eq!(policy.budget(), 1);
        assert_eq!(policy.attempts().count(), 1);
        assert!(!policy.should_backoff(1));
    }

    #[test]
    fn deserialized_zero_budget_is_clamped_to_one_attempt() {
        let policy: RetryPolicy =
            serde_json::from_str(r#"{"budget":0,"backoff":{"secs":0,"nanos":0}}"#).unwrap();
        assert_eq!(policy.budget(), 1);
        assert_eq!(policy.attempts().count(), 1);
    }

    #[test]
    fn serialized_policy_reads_back_unchanged() {
        let policy = RetryPolicy::fixed(4, Duration::from_millis(1500));
        let json = serde_json::to_string(&policy).unwrap();
        assert_eq!(serde_json::from_str::<RetryPolicy>(&json).unwrap(), policy);
    }

    #[test]
    fn with_budget_keeps_backoff() {
        let policy = RetryPolicy::fixed(2, Duration::from_millis(250)).with_budget(5);
        assert_eq!(policy.budget(), 5);
        assert_eq!(policy.backoff(), Duration::from_millis(250));
    }

    proptest! {
        /// Property: a budget of N yields N attempts separated by exactly N-1 backoffs.
        #[test]
        fn backoffs_are_one_less_than_attempts(budget in 1u32..50) {
            let policy = RetryPolicy::fixed(budget, Duration::from_secs(1));
            let attempts: Vec<u32> = policy.attempts().collect();
            let backoffs = attempts.iter().filter(|a| policy.should_backoff(**a)).count();

            prop_assert_eq!(attempts.len() as u32, budget);
            prop_assert_eq!(backoffs as u32, budget - 1);
        }
    }
}
