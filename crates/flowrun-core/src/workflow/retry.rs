//! Retry policy for failed step attempts.
//!
//! Stateless: all logic is in associated functions that take the retry
//! configuration as a parameter.

use std::time::Duration;

use flowrun_types::config::RetryConfig;

use super::step::StepError;

/// Upper bound on a single backoff delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

pub struct RetryHandler;

impl RetryHandler {
    /// Whether a failed attempt should be retried.
    ///
    /// `attempt` is 1-based. Only transient failures and timeouts are
    /// retried, and never past `config.max_attempts` total attempts.
    pub fn should_retry(config: &RetryConfig, attempt: u32, error: &StepError) -> bool {
        error.is_retryable() && attempt < config.max_attempts
    }

    /// Delay before attempt `attempt + 1`: `backoff_ms * 2^(attempt - 1)`.
    pub fn backoff(config: &RetryConfig, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let millis = config.backoff_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(millis).min(MAX_BACKOFF)
    }
}
