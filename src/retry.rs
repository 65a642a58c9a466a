//! Bounded retry decisions for checks.
//!
//! Automated remote checks get a budget of attempts; every other category is
//! judged exactly once. The policy is pure: it never touches a session.

use crate::catalog::Category;
use crate::session::Verdict;

/// Default attempt budget for automated remote checks.
pub const DEFAULT_REMOTE_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    remote_max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            remote_max_attempts: DEFAULT_REMOTE_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// Policy with a custom budget for remote checks. Clamped to at least one attempt.
    pub fn new(remote_max_attempts: u32) -> Self {
        Self {
            remote_max_attempts: remote_max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self, category: Category) -> u32 {
        if category.is_retry_eligible() {
            self.remote_max_attempts
        } else {
            1
        }
    }

    /// True only when the last attempt failed, the category may be retried and
    /// the budget is not yet spent.
    pub fn should_retry(&self, category: Category, attempts_so_far: u32, last: Verdict) -> bool {
        last == Verdict::Fail
            && category.is_retry_eligible()
            && attempts_so_far < self.max_attempts(category)
    }

    /// Every permitted retry is confirmed by the operator.
    pub fn should_prompt(&self, category: Category, attempts_so_far: u32, last: Verdict) -> bool {
        self.should_retry(category, attempts_so_far, last)
    }
}
