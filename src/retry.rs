//! Retry policy and per-fetch retry state
//!
//! The policy is fixed: at most [`MAX_RETRIES`] retries per fetch, with the
//! wait chosen by how long the fetch has been retrying:
//!
//! | elapsed since first retryable response | delay |
//! |----------------------------------------|-------|
//! | under 5 minutes                        | 3 s   |
//! | under 10 minutes                       | 9 s   |
//! | otherwise                              | 27 s  |
//!
//! A server-supplied `Retry-After: <seconds>` replaces the tiered delay for
//! that one retry but still counts against the ceiling.

use std::time::Duration;
use tokio::time::Instant;

/// Maximum number of retries per fetch. The attempt after the last retry fails fast.
pub const MAX_RETRIES: u32 = 10;

/// HTTP statuses treated as transient
pub const RETRYABLE_STATUSES: [u16; 4] = [429, 502, 503, 504];

/// Trait for responses or errors that can be classified as retryable or not
pub trait IsRetryable {
    /// Returns true if the condition is transient and the request should be retried
    fn is_retryable(&self) -> bool;
}

/// HTTP status codes: 429 and the 502/503/504 gateway family are transient
impl IsRetryable for reqwest::StatusCode {
    fn is_retryable(&self) -> bool {
        RETRYABLE_STATUSES.contains(&self.as_u16())
    }
}

/// Tiered backoff schedule
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed before the fetch gives up
    pub max_retries: u32,
    /// Elapsed time below which the first tier applies
    pub first_tier_limit: Duration,
    /// Elapsed time below which the second tier applies
    pub second_tier_limit: Duration,
    /// Delay of the first tier
    pub first_tier_delay: Duration,
    /// Delay of the second tier
    pub second_tier_delay: Duration,
    /// Delay once both limits are passed
    pub final_tier_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            first_tier_limit: Duration::from_secs(5 * 60),
            second_tier_limit: Duration::from_secs(10 * 60),
            first_tier_delay: Duration::from_secs(3),
            second_tier_delay: Duration::from_secs(9),
            final_tier_delay: Duration::from_secs(27),
        }
    }
}

impl RetryPolicy {
    /// Delay to apply given the time elapsed since the first retryable response.
    pub fn backoff_for(&self, elapsed: Duration) -> Duration {
        if elapsed < self.first_tier_limit {
            self.first_tier_delay
        } else if elapsed < self.second_tier_limit {
            self.second_tier_delay
        } else {
            self.final_tier_delay
        }
    }
}

/// Parse a `Retry-After` header given as an integer number of seconds.
///
/// HTTP-date forms, negative numbers and garbage return `None`, which sends
/// the caller to the tiered backoff.
pub fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value?.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Mutable retry bookkeeping for a single fetch. Never shared.
#[derive(Debug, Default)]
pub struct RetryState {
    attempts: u32,
    first_retry_at: Option<Instant>,
    last_delay: Option<Duration>,
}

impl RetryState {
    /// Fresh state for a new fetch
    pub fn new() -> Self {
        Self::default()
    }

    /// Retries registered so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Most recent delay handed out
    pub fn last_delay(&self) -> Option<Duration> {
        self.last_delay
    }

    /// Register one retryable failure and decide how long to wait.
    ///
    /// Returns `None` once the ceiling is exceeded; the fetch must then fail.
    pub fn next_delay(
        &mut self,
        policy: &RetryPolicy,
        retry_after: Option<Duration>,
    ) -> Option<Duration> {
        self.attempts += 1;
        if self.attempts > policy.max_retries {
            return None;
        }

        let first = *self.first_retry_at.get_or_insert_with(Instant::now);
        let delay = match retry_after {
            Some(hint) => hint,
            None => policy.backoff_for(first.elapsed()),
        };
        self.last_delay = Some(delay);
        Some(delay)
    }
}
