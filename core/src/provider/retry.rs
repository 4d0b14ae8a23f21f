use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;

use crate::config::Strategy;

lazy_static! {
    /// Transient failure markers: timeouts, connection-level errors, DNS
    /// lookup failures, rate limiting, retryable HTTP statuses and fetch
    /// failures.
    static ref RETRYABLE: Regex = Regex::new(
        r"(?i)timeout|timed out|network|econnreset|connection reset|econnrefused|connection refused|enotfound|dns error|fetch failed|rate limit|too many requests|\b(?:408|429|500|502|503|504)\b"
    )
    .expect("retryable error pattern is valid");
}

/// Classifies a provider failure message as transient.
pub fn is_retryable_error(message: &str) -> bool {
    RETRYABLE.is_match(message)
}

/// Per-attempt timeout: `timeout_ms * (1 + 0.5 * attempt)`.
pub fn attempt_timeout_ms(timeout_ms: u64, attempt: u32) -> u64 {
    timeout_ms.saturating_mul(2 + u64::from(attempt)) / 2
}

/// Retry policy applied to one provider's attempts.
pub trait RetryPolicy: Send + Sync {
    fn name(&self) -> &str;
    /// Total attempts per provider, including the first one.
    fn max_attempts(&self) -> u32;
    /// Delay to wait after `attempt` (0-indexed) failed.
    fn next_delay(&self, attempt: u32) -> Duration;
    fn is_retryable(&self, error: &str) -> bool {
        is_retryable_error(error)
    }
    fn should_retry(&self, attempt: u32, error: &str) -> bool {
        attempt.saturating_add(1) < self.max_attempts() && self.is_retryable(error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl ExponentialBackoff {
    pub fn from_strategy(strategy: &Strategy) -> Self {
        Self {
            base_delay_ms: strategy.backoff_base_ms,
            max_delay_ms: strategy.backoff_max_ms,
            max_attempts: strategy.retry_attempts.saturating_add(1),
        }
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn name(&self) -> &str {
        "exponential-backoff"
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    fn next_delay(&self, attempt: u32) -> Duration {
        let exp = 1u64 << attempt.min(30);
        let delay = self.base_delay_ms.saturating_mul(exp);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}
