//! Error types for the retry engine, the response cache and its stores
use std::time::Duration;
use thiserror::Error;

/// Terminal failure of a retried call.
///
/// Only the most recent failure is kept; earlier ones are reported through tracing and the
/// policy's `on_retry` observer as they happen.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every allowed attempt failed.
    #[error("failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: usize,
        #[source]
        last: E,
    },
    /// The policy's `should_retry` predicate classified the failure as not retryable.
    #[error("attempt {attempt} failed with a non-retryable error: {cause}")]
    Rejected {
        attempt: usize,
        #[source]
        cause: E,
    },
}

impl<E> RetryError<E> {
    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> usize {
        match self {
            Self::Exhausted { attempts, .. } => *attempts,
            Self::Rejected { attempt, .. } => *attempt,
        }
    }

    /// The last underlying failure.
    pub fn cause(&self) -> &E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Rejected { cause, .. } => cause,
        }
    }

    pub fn into_cause(self) -> E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Rejected { cause, .. } => cause,
        }
    }

    /// Check if the attempt budget ran out
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    /// Check if the failure was classified as non-retryable
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// Errors produced while building a retry policy or backoff.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// `max_attempts` must be > 0.
    #[error("max_attempts must be > 0 (got {0})")]
    InvalidMaxAttempts(usize),
    /// Backoff cap below the base delay.
    #[error("backoff max ({max:?}) must be >= base ({base:?})")]
    InvalidBackoffCap { base: Duration, max: Duration },
}

/// Errors raised by the bundled key-value stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store file is not a JSON object of strings: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from explicit cache operations.
#[derive(Debug, Error)]
pub enum CacheError<SE> {
    /// The backing store failed.
    #[error("cache store failed: {0}")]
    Store(#[source] SE),
    /// The value could not be (de)serialized.
    #[error("cache value could not be encoded: {0}")]
    Codec(#[from] serde_json::Error),
}
