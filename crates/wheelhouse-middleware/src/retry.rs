//! [`RetryGuard`] – bounded retry with exponential backoff for failed
//! commands.
//!
//! A failed command is re-sent to its device as a delayed self-addressed
//! message. The guard counts failures per message id; each retry waits twice
//! as long as the previous one, up to a cap, and after `max_attempts` retries
//! the command is abandoned.
//!
//! # Example
//!
//! ```rust
//! use wheelhouse_middleware::retry::{RetryGuard, RetryPolicy};
//!
//! let mut guard = RetryGuard::new(RetryPolicy {
//!     max_attempts: 3,
//!     base_backoff_ms: 100,
//!     max_backoff_ms: 250,
//! });
//!
//! assert_eq!(guard.record_failure(7), Some(100));
//! assert_eq!(guard.record_failure(7), Some(200));
//! assert_eq!(guard.record_failure(7), Some(250)); // capped
//! assert_eq!(guard.record_failure(7), None);      // give up
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// How persistently failed commands are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first failure. `0` disables retrying.
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 100,
            max_backoff_ms: 2000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> u64 {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        self.base_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms)
    }
}

#[derive(Debug, Default)]
pub struct RetryGuard {
    policy: RetryPolicy,
    failures: HashMap<u64, u32>,
}

impl RetryGuard {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            failures: HashMap::new(),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: RetryPolicy) {
        self.policy = policy;
    }

    /// Count a failure of message `id`. Returns the delay for the next retry,
    /// or `None` once the budget is spent (the id is then forgotten).
    pub fn record_failure(&mut self, id: u64) -> Option<u64> {
        let failures = self.failures.entry(id).or_insert(0);
        *failures += 1;
        let attempt = *failures;
        if attempt > self.policy.max_attempts {
            self.failures.remove(&id);
            return None;
        }
        Some(self.policy.backoff(attempt))
    }

    /// Forget `id` after it finally succeeded.
    pub fn record_success(&mut self, id: u64) {
        self.failures.remove(&id);
    }

    /// Failures recorded so far for `id`.
    pub fn failures(&self, id: u64) -> u32 {
        self.failures.get(&id).copied().unwrap_or(0)
    }

    /// Ids currently being retried.
    pub fn pending(&self) -> usize {
        self.failures.len()
    }
}
