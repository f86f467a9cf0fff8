//! Retry policy for remote calls
//!
//! Pure decision logic, independent of any transport: given what an attempt
//! produced and how many attempts have been made, either retry after a delay
//! or hand the outcome back to the caller.
//!
//! Retries trigger on 408, 429, any 5xx and transport-level failures. Backoff
//! before retry `n` (0-indexed) is `base_delay * 2^n`, without jitter.

use std::time::Duration;

use crate::config::ResilienceConfig;

/// Check if an HTTP status code is retryable
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429) || status >= 500
}

/// What a single attempt produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The service answered with this status
    Status(u16),
    /// The request never got an answer (connect, reset, timeout)
    TransportFailure,
    /// A failure no retry can fix
    Fatal,
}

/// Next step after an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep, then try again
    Retry { delay: Duration },
    /// Hand the outcome to the caller as-is
    Return,
}

/// Retry budget and backoff base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ResilienceConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay: base_delay.max(Duration::from_millis(1)),
        }
    }

    /// Single attempt, no retries
    pub fn disabled() -> Self {
        Self::new(0, Duration::from_millis(1))
    }

    /// Policy from configuration; disabled resilience means one attempt
    pub fn from_config(config: &ResilienceConfig) -> Self {
        if config.enabled {
            Self::new(config.max_retries, config.base_delay())
        } else {
            Self::disabled()
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total attempts including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before the retry that follows attempt `attempt` (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Decide what to do after attempt `attempt` (0-indexed) produced `outcome`
    pub fn decide(&self, outcome: AttemptOutcome, attempt: u32) -> RetryDecision {
        if attempt >= self.max_retries {
            return RetryDecision::Return;
        }

        let retryable = match outcome {
            AttemptOutcome::Status(status) => is_retryable_status(status),
            AttemptOutcome::TransportFailure => true,
            AttemptOutcome::Fatal => false,
        };

        if retryable {
            RetryDecision::Retry {
                delay: self.delay_for_attempt(attempt),
            }
        } else {
            RetryDecision::Return
        }
    }
}
