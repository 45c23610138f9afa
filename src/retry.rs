//! Retry Logic with Exponential Backoff
//!
//! Origin fetches that fail with a transient network error are retried with
//! an exponential delay between attempts. Missing objects and permission
//! errors are never retried: repeating them cannot change the outcome.
//!
//! ## Exponential Backoff
//!
//! - Attempt 1: No delay (immediate)
//! - Attempt 2: `initial_backoff_ms`
//! - Attempt 3: 2x the previous delay
//! - Capped at `max_backoff_ms`
//!
//! ## Configuration Example
//!
//! ```yaml
//! origin:
//!   retry:
//!     max_attempts: 2
//!     initial_backoff_ms: 250
//!     max_backoff_ms: 2000
//! ```

use std::time::Duration;

use crate::origin::OriginErrorKind;

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including initial attempt)
    pub max_attempts: u32,
    /// Initial backoff delay in milliseconds
    pub initial_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds (cap for exponential growth)
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::constants::DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: crate::constants::DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: crate::constants::DEFAULT_MAX_BACKOFF_MS,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms,
            max_backoff_ms,
        }
    }

    /// A policy that makes exactly one attempt
    pub fn no_retry() -> Self {
        Self::new(1, 0, 0)
    }

    /// Only transient network failures are worth another attempt
    pub fn is_retriable(&self, kind: OriginErrorKind) -> bool {
        kind == OriginErrorKind::Network
    }

    /// Calculate backoff delay for a given attempt number (0-indexed)
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(0);
        }

        // Exponential backoff: initial_backoff * 2^(attempt-1)
        let backoff_ms = self
            .initial_backoff_ms
            .saturating_mul(2u64.saturating_pow(attempt - 1))
            .min(self.max_backoff_ms);

        Duration::from_millis(backoff_ms)
    }

    /// Check if we should retry given the current attempt number and failure kind
    pub fn should_retry(&self, attempt: u32, kind: OriginErrorKind) -> bool {
        if attempt.saturating_add(1) >= self.max_attempts {
            return false;
        }
        self.is_retriable(kind)
    }
}
