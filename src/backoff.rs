//! Exponential backoff between retry attempts.
//!
//! Attempt semantics: attempt index `0` represents the initial call (no delay); the delay
//! before the retry that follows failed attempt `k` (1-based) is `base * 2^(k-1)`.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use pulse_retry::Backoff;
//!
//! let backoff = Backoff::exponential(Duration::from_millis(1000));
//! assert_eq!(backoff.delay(0), Duration::ZERO);
//! assert_eq!(backoff.delay(1), Duration::from_millis(1000));
//! assert_eq!(backoff.delay(2), Duration::from_millis(2000));
//! assert_eq!(backoff.delay(3), Duration::from_millis(4000));
//! ```
//!
//! Overflow behavior: computations that would overflow saturate to `MAX_BACKOFF` (1 day).

use crate::error::BuildError;
use std::time::Duration;

/// Maximum delay used when calculations overflow (1 day).
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Doubling delay schedule with an optional ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Option<Duration>,
}

impl Backoff {
    /// Exponential backoff starting at `base` for the first retry.
    pub fn exponential(base: Duration) -> Self {
        Self { base, max: None }
    }

    /// Cap every delay at `max`. Fails if `max` is below the base delay.
    pub fn with_max(mut self, max: Duration) -> Result<Self, BuildError> {
        if max < self.base {
            return Err(BuildError::InvalidBackoffCap { base: self.base, max });
        }
        self.max = Some(max);
        Ok(self)
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    /// Delay to wait after failed attempt `attempt` (1-based; 0 = initial call, no delay).
    pub fn delay(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(u32::MAX as usize) as u32;
        let multiplier = 2u128.saturating_pow(exponent);
        let nanos = self.base.as_nanos().saturating_mul(multiplier);
        let delay = Duration::from_nanos(nanos.min(MAX_BACKOFF.as_nanos()) as u64);
        self.max.map(|m| delay.min(m)).unwrap_or(delay).min(MAX_BACKOFF)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::exponential(Duration::from_millis(1000))
    }
}
