//! Jitter added on top of the backoff delay.
//!
//! Retriers hitting the same remote service after a shared outage would otherwise wake up in
//! lock-step. Jitter here is *additive*: a uniform random amount in `[0, max)` is added to the
//! exponential delay, so the backoff floor is always honored.
//!
//! RNG: `rand`'s thread-local RNG by default; deterministic RNGs can be injected via
//! [`Jitter::apply_with_rng`].

use rand::{rng, Rng};
use std::time::Duration;

/// Jitter strategy for randomizing retry delays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jitter {
    /// Use the exact backoff delay
    None,
    /// Add a random extra delay in `[0, max)`
    Additive(Duration),
}

impl Jitter {
    /// Additive jitter bounded by `max`. A zero bound behaves like [`Jitter::None`].
    pub fn up_to(max: Duration) -> Self {
        if max.is_zero() {
            Jitter::None
        } else {
            Jitter::Additive(max)
        }
    }

    /// Upper (exclusive) bound of the added delay.
    pub fn max(&self) -> Duration {
        match self {
            Jitter::None => Duration::ZERO,
            Jitter::Additive(max) => *max,
        }
    }

    /// Apply jitter to a delay duration
    pub fn apply(&self, delay: Duration) -> Duration {
        let mut rng = rng();
        self.apply_with_rng(delay, &mut rng)
    }

    /// Apply jitter with a custom RNG (for testing)
    pub fn apply_with_rng<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        match self {
            Jitter::None => delay,
            Jitter::Additive(max) => {
                let nanos = u64::try_from(max.as_nanos()).unwrap_or(u64::MAX);
                if nanos == 0 {
                    return delay;
                }
                delay.saturating_add(Duration::from_nanos(rng.random_range(0..nanos)))
            }
        }
    }
}

impl Default for Jitter {
    fn default() -> Self {
        Jitter::Additive(Duration::from_millis(1000))
    }
}
