//! Retry logic with exponential backoff for transient transfer failures.
//!
//! When a download attempt fails, the error is classified into a
//! [`FailureType`]:
//! - [`FailureType::Transient`] - may succeed on another attempt (network
//!   errors, any HTTP error status, interrupted streams, write failures)
//! - [`FailureType::Permanent`] - will not succeed regardless of retries
//!
//! The [`RetryPolicy`] then decides whether to retry and how long to wait.
//! The wait before attempt `k` is `unit * 2^k`, so with the default one-second
//! unit the waits are 4s and then 8s. Past the 60 s soft cap each further wait
//! grows by one unit, and jitter never exceeds half a unit, so every wait is
//! strictly longer than the one before it.
//!
//! ```
//! use std::time::Duration;
//! use harvester_core::download::{DownloadError, RetryDecision, RetryPolicy, classify_error};
//!
//! let policy = RetryPolicy::with_max_attempts(3).with_max_jitter(Duration::ZERO);
//! let failed = DownloadError::http_status("https://example.com/consulta_cand_2024.zip", 503);
//!
//! let decision = policy.should_retry(classify_error(&failed), 1);
//! assert_eq!(decision, RetryDecision::Retry { delay: Duration::from_secs(4), attempt: 2 });
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use super::DownloadError;

/// Attempts per file, first try included.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Multiplied by `2^attempt`.
const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(1);

const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(250);

/// Whether another attempt could change the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    Transient,
    Permanent,
}

/// Outcome of [`RetryPolicy::should_retry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for `delay`, then make attempt number `attempt`.
    Retry {
        delay: Duration,
        attempt: u32,
    },

    /// Give up; `reason` ends up in the log.
    DoNotRetry {
        reason: String,
    },
}

/// Attempt cap plus exponential backoff:
/// `min(unit * 2^k, max_delay + unit * k) + jitter` before attempt `k`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    unit: Duration,
    /// Soft cap; past it waits grow linearly by one unit.
    max_delay: Duration,
    /// Zero disables jitter. Clamped to half a unit.
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            unit: DEFAULT_BACKOFF_UNIT,
            max_delay: DEFAULT_MAX_DELAY,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }
}

impl RetryPolicy {
    /// Fully explicit policy. `max_attempts` is raised to at least one.
    #[must_use]
    pub fn new(max_attempts: u32, unit: Duration, max_delay: Duration, max_jitter: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            unit,
            max_delay,
            max_jitter,
        }
    }

    /// Default backoff with a different attempt cap.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Replaces the backoff unit.
    #[must_use]
    pub fn with_unit(mut self, unit: Duration) -> Self {
        self.unit = unit;
        self
    }

    /// Replaces the jitter bound.
    #[must_use]
    pub fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Determines whether to retry a failed attempt.
    ///
    /// `attempt` is the attempt number that just failed (1-indexed).
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "error is not retryable".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, cap = self.max_attempts, "attempt cap reached");
            return RetryDecision::DoNotRetry {
                reason: format!("all {} attempts exhausted", self.max_attempts),
            };
        }

        let upcoming = attempt + 1;
        let delay = self.backoff_for(upcoming);
        debug!(attempt, upcoming, wait_ms = delay.as_millis(), "scheduling retry");
        RetryDecision::Retry {
            delay,
            attempt: upcoming,
        }
    }

    fn backoff_for(&self, upcoming: u32) -> Duration {
        let exponential = self.unit.saturating_mul(2_u32.saturating_pow(upcoming));
        let ceiling = self.max_delay.saturating_add(self.unit.saturating_mul(upcoming));
        exponential.min(ceiling) + self.jitter()
    }

    // Consecutive bases differ by at least one unit; half a unit of jitter
    // cannot reorder them.
    fn jitter(&self) -> Duration {
        let room = self.max_jitter.min(self.unit / 2);
        let bound = u64::try_from(room.as_millis()).unwrap_or(u64::MAX);
        match bound {
            0 => Duration::ZERO,
            _ => Duration::from_millis(rand::thread_rng().gen_range(0..=bound)),
        }
    }
}

/// Only a malformed URL or an unbuildable client is final. Every HTTP status,
/// network fault and local write failure is retried up to the cap, resuming
/// from the partial file.
#[must_use]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::InvalidUrl { .. } | DownloadError::ClientSetup { .. } => FailureType::Permanent,
        DownloadError::HttpStatus { .. }
        | DownloadError::Timeout { .. }
        | DownloadError::Network { .. }
        | DownloadError::Interrupted { .. }
        | DownloadError::RangeNotSatisfiable { .. }
        | DownloadError::RangeMismatch { .. }
        | DownloadError::Io { .. }
        | DownloadError::Integrity { .. } => FailureType::Transient,
    }
}
