//! Retry engine
//!
//! Re-issues a fallible async operation with exponential backoff and additive jitter.
//!
//! Semantics:
//! - `max_attempts` counts total attempts (initial try + retries).
//! - Attempts are strictly sequential; attempt `n + 1` starts only after attempt `n` failed and
//!   its backoff delay elapsed.
//! - The delay after failed attempt `k` is `base * 2^(k-1) + uniform[0, jitter_max)`. There is
//!   no delay after the final attempt.
//! - Every failure is logged at `warn` and passed to the `on_retry` observer (if any) before the
//!   sleep. The observer cannot influence control flow; a panic inside it propagates.
//! - `should_retry` decides whether a failure is worth another attempt; a `false` stops at once
//!   with [`RetryError::Rejected`].
//! - Sleeper controls how delays are applied (production uses `TokioSleeper`; tests can inject
//!   `InstantSleeper`/`TrackingSleeper`/`ClockSleeper`).
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use pulse_retry::{RetryError, RetryPolicy};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let policy = RetryPolicy::<std::io::Error>::builder()
//!     .max_attempts(3)
//!     .base_delay(Duration::from_millis(10))
//!     .jitter_max(Duration::ZERO)
//!     .build()
//!     .unwrap();
//! let result: Result<(), RetryError<std::io::Error>> =
//!     policy.execute(|| async { Err(std::io::Error::other("offline")) }).await;
//! assert_eq!(result.unwrap_err().to_string(), "failed after 3 attempts: offline");
//! # });
//! ```

use crate::error::{BuildError, RetryError};
use crate::{Backoff, Jitter, Sleeper, TokioSleeper};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

type Predicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;
type Observer<E> = Arc<dyn Fn(usize, &E) + Send + Sync>;

/// Retry policy combining attempt budget, backoff, jitter, classification and sleeper.
pub struct RetryPolicy<E> {
    max_attempts: usize,
    backoff: Backoff,
    jitter: Jitter,
    should_retry: Predicate<E>,
    on_retry: Option<Observer<E>>,
    sleeper: Arc<dyn Sleeper>,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            jitter: self.jitter,
            should_retry: self.should_retry.clone(),
            on_retry: self.on_retry.clone(),
            sleeper: self.sleeper.clone(),
        }
    }
}

impl<E> std::fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .field("sleeper", &self.sleeper)
            .field("should_retry", &"<predicate>")
            .field("on_retry", &self.on_retry.as_ref().map(|_| "<observer>"))
            .finish()
    }
}

impl<E> RetryPolicy<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Construct a new builder with defaults.
    pub fn builder() -> RetryPolicyBuilder<E> {
        RetryPolicyBuilder::new()
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    pub fn jitter(&self) -> Jitter {
        self.jitter
    }

    /// Randomized delay to wait after failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: usize) -> Duration {
        self.jitter.apply(self.backoff.delay(attempt))
    }

    /// Execute an async operation with retry semantics.
    pub async fn execute<T, Fut, Op>(&self, mut operation: Op) -> Result<T, RetryError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
        Op: FnMut() -> Fut,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            warn!(attempt, max_attempts = self.max_attempts, error = %err, "remote call attempt failed");
            if let Some(observer) = &self.on_retry {
                observer(attempt, &err);
            }

            if !(self.should_retry)(&err) {
                return Err(RetryError::Rejected { attempt, cause: err });
            }
            if attempt >= self.max_attempts {
                return Err(RetryError::Exhausted { attempts: attempt, last: err });
            }

            let delay = self.delay_for(attempt);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "backing off before retry");
            self.sleeper.sleep(delay).await;
        }
    }
}

impl<E> Default for RetryPolicy<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn default() -> Self {
        let b = RetryPolicyBuilder::new();
        Self {
            max_attempts: b.max_attempts,
            backoff: b.backoff,
            jitter: b.jitter,
            should_retry: b.should_retry,
            on_retry: b.on_retry,
            sleeper: b.sleeper,
        }
    }
}

/// Builder for `RetryPolicy`.
pub struct RetryPolicyBuilder<E> {
    max_attempts: usize,
    backoff: Backoff,
    jitter: Jitter,
    should_retry: Predicate<E>,
    on_retry: Option<Observer<E>>,
    sleeper: Arc<dyn Sleeper>,
}

impl<E> RetryPolicyBuilder<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// 3 attempts, 1s base delay, up to 1s of jitter, everything retryable.
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::default(),
            jitter: Jitter::default(),
            should_retry: Arc::new(|_| true),
            on_retry: None,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Set total attempts (initial + retries). Must be > 0.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Shorthand for an uncapped exponential backoff starting at `base`.
    pub fn base_delay(mut self, base: Duration) -> Self {
        self.backoff = Backoff::exponential(base);
        self
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Shorthand for [`Jitter::up_to`].
    pub fn jitter_max(mut self, max: Duration) -> Self {
        self.jitter = Jitter::up_to(max);
        self
    }

    /// Predicate to decide if a failure is retryable.
    pub fn should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    /// Observer called with `(attempt, &error)` after every failed attempt.
    pub fn on_retry<F>(mut self, observer: F) -> Self
    where
        F: Fn(usize, &E) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(observer));
        self
    }

    /// Provide a custom sleeper implementation.
    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Build the retry policy, validating inputs.
    pub fn build(self) -> Result<RetryPolicy<E>, BuildError> {
        if self.max_attempts == 0 {
            return Err(BuildError::InvalidMaxAttempts(0));
        }
        Ok(RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            jitter: self.jitter,
            should_retry: self.should_retry,
            on_retry: self.on_retry,
            sleeper: self.sleeper,
        })
    }
}

impl<E> Default for RetryPolicyBuilder<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InstantSleeper, TrackingSleeper};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError(String);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl std::error::Error for TestError {}

    fn instant(attempts: usize) -> RetryPolicyBuilder<TestError> {
        RetryPolicy::builder().max_attempts(attempts).with_sleeper(InstantSleeper)
    }

    #[tokio::test]
    async fn success_first_attempt() {
        let policy = instant(3).build().expect("builder");
        let counter = Arc::new(AtomicUsize::new(0));

        let result = policy
            .execute(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, TestError>(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1, "Should only execute once");
    }

    #[tokio::test]
    async fn success_after_retries() {
        let policy = instant(5).build().expect("builder");
        let counter = Arc::new(AtomicUsize::new(0));

        let result = policy
            .execute(|| {
                let counter = counter.clone();
                async move {
                    let attempt = counter.fetch_add(1, Ordering::SeqCst);
                    if attempt < 2 {
                        Err(TestError(format!("attempt {}", attempt)))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3, "Should succeed on 3rd attempt");
    }

    #[tokio::test]
    async fn exhaustion_keeps_only_last_failure() {
        let policy = instant(3).build().expect("builder");
        let counter = Arc::new(AtomicUsize::new(0));

        let result = policy
            .execute(|| {
                let counter = counter.clone();
                async move {
                    let attempt = counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(TestError(format!("attempt {}", attempt)))
                }
            })
            .await;

        assert_eq!(counter.load(Ordering::SeqCst), 3);
        match result.unwrap_err() {
            RetryError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert_eq!(last.0, "attempt 2");
            }
            e => panic!("Expected Exhausted, got {:?}", e),
        }
    }

    #[tokio::test]
    async fn single_attempt_never_sleeps() {
        let sleeper = TrackingSleeper::new();
        let policy = RetryPolicy::builder()
            .max_attempts(1)
            .with_sleeper(sleeper.clone())
            .build()
            .expect("builder");

        let result = policy.execute(|| async { Err::<(), _>(TestError("down".into())) }).await;

        assert_eq!(result.unwrap_err().attempts(), 1);
        assert!(sleeper.calls().is_empty());
    }

    #[tokio::test]
    async fn exponential_delays_without_jitter() {
        let sleeper = TrackingSleeper::new();
        let policy = RetryPolicy::builder()
            .max_attempts(4)
            .base_delay(Duration::from_millis(100))
            .with_jitter(Jitter::None)
            .with_sleeper(sleeper.clone())
            .build()
            .expect("builder");

        let _ = policy.execute(|| async { Err::<(), _>(TestError("fail".into())) }).await;

        assert_eq!(
            sleeper.calls(),
            vec![Duration::from_millis(100), Duration::from_millis(200), Duration::from_millis(400)]
        );
    }

    #[tokio::test]
    async fn jitter_stays_within_window() {
        let sleeper = TrackingSleeper::new();
        let policy = RetryPolicy::builder()
            .max_attempts(5)
            .base_delay(Duration::from_millis(100))
            .jitter_max(Duration::from_millis(50))
            .with_sleeper(sleeper.clone())
            .build()
            .expect("builder");

        let _ = policy.execute(|| async { Err::<(), _>(TestError("fail".into())) }).await;

        let calls = sleeper.calls();
        assert_eq!(calls.len(), 4);
        for (idx, delay) in calls.into_iter().enumerate() {
            let floor = Duration::from_millis(100 * (1 << idx));
            assert!(delay >= floor);
            assert!(delay < floor + Duration::from_millis(50));
        }
    }

    #[tokio::test]
    async fn non_retryable_error_stops_immediately() {
        let sleeper = TrackingSleeper::new();
        let policy = RetryPolicy::builder()
            .max_attempts(5)
            .with_sleeper(sleeper.clone())
            .should_retry(|e: &TestError| e.0.contains("transient"))
            .build()
            .expect("builder");
        let counter = Arc::new(AtomicUsize::new(0));

        let result = policy
            .execute(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(TestError("invalid surah number".into()))
                }
            })
            .await;

        assert!(result.unwrap_err().is_rejected());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(sleeper.calls().is_empty());
    }

    #[tokio::test]
    async fn observer_sees_every_failure_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let policy = instant(3)
            .on_retry(move |attempt, e: &TestError| {
                sink.lock().unwrap().push((attempt, e.0.clone()));
            })
            .build()
            .expect("builder");
        let counter = Arc::new(AtomicUsize::new(0));

        let _ = policy
            .execute(|| {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    Err::<(), _>(TestError(format!("e{}", n)))
                }
            })
            .await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(1, "e1".to_string()), (2, "e2".to_string()), (3, "e3".to_string())]
        );
    }

    #[tokio::test]
    #[should_panic(expected = "observer bug")]
    async fn observer_panic_is_not_retried() {
        let policy = instant(3).on_retry(|_, _| panic!("observer bug")).build().expect("builder");
        let _ = policy.execute(|| async { Err::<(), _>(TestError("x".into())) }).await;
    }

    #[test]
    fn builder_rejects_zero_attempts() {
        let err = RetryPolicy::<TestError>::builder().max_attempts(0).build();
        assert!(matches!(err, Err(BuildError::InvalidMaxAttempts(0))));
    }

    #[test]
    fn defaults_match_remote_api_usage() {
        let policy = RetryPolicy::<TestError>::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.backoff().base(), Duration::from_millis(1000));
        assert_eq!(policy.jitter().max(), Duration::from_millis(1000));
    }
}
