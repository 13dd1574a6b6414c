//! Retry and backoff policy for page-local failures

use std::time::Duration;

/// What to do with a page whose fetch failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Dispatch the page again after `delay`, as attempt number `retry`
    Requeue { retry: u32, delay: Duration },

    /// Stop trying this page; the run carries on without it
    GiveUp,
}

/// Bounded linear-backoff retry policy
///
/// The backoff for the n-th requeue is `n × backoff_step`. It is separate from
/// the fixed per-request delay that workers apply to every fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_step: Duration) -> Self {
        Self {
            max_retries,
            backoff_step,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Decides whether a page that has already been requeued `retry_count`
    /// times gets another attempt
    pub fn decide(&self, page: u32, retry_count: u32) -> RetryDecision {
        if retry_count >= self.max_retries {
            tracing::trace!("Page {} exhausted {} retries", page, self.max_retries);
            return RetryDecision::GiveUp;
        }

        let retry = retry_count + 1;
        RetryDecision::Requeue {
            retry,
            delay: self.backoff_step.saturating_mul(retry),
        }
    }
}
