//! Observable call state around the retry engine.
//!
//! [`RetryCall`] and [`CachedCall`] bind a producer and a [`RetryPolicy`] to a [`CallState`]
//! that callers (typically a UI layer) can snapshot or subscribe to.
//!
//! State machine: `Idle -> Loading -> (Succeeded | Failed)`, `reset()` returns to `Idle` from
//! anywhere.
//! - `execute()` never fails; failures land in `CallState::error`.
//! - Entering `Loading` clears `error`. Success sets `data` and clears `error`. Failure sets
//!   `error` and keeps the previous `data`.
//! - While an `execute()` is loading, further calls on the same binding are no-ops that return
//!   [`Settled::Busy`].
//! - `reset()` starts a new epoch. An `execute()` still in flight from an older epoch discards
//!   its result (and, for [`CachedCall`], never writes the cache).
//! - Dropping an `execute()` future cancels the remaining attempts and clears `loading`.
//! - Cache hits never pass through `Loading`.

use crate::cache::ResponseCache;
use crate::clock::{Clock, SystemClock};
use crate::error::RetryError;
use crate::retry::RetryPolicy;
use crate::store::KvStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Observable status of one logical remote call.
#[derive(Debug)]
pub struct CallState<T, E> {
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<Arc<RetryError<E>>>,
}

impl<T, E> Default for CallState<T, E> {
    fn default() -> Self {
        Self { data: None, loading: false, error: None }
    }
}

impl<T: Clone, E> Clone for CallState<T, E> {
    fn clone(&self) -> Self {
        Self { data: self.data.clone(), loading: self.loading, error: self.error.clone() }
    }
}

/// Coarse projection of a [`CallState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Succeeded,
    Failed,
}

impl<T, E> CallState<T, E> {
    pub fn phase(&self) -> Phase {
        if self.loading {
            Phase::Loading
        } else if self.error.is_some() {
            Phase::Failed
        } else if self.data.is_some() {
            Phase::Succeeded
        } else {
            Phase::Idle
        }
    }

    pub fn is_idle(&self) -> bool {
        self.phase() == Phase::Idle
    }
}

impl<T, E: std::fmt::Display> CallState<T, E> {
    /// Rendered terminal error, e.g. `failed after 3 attempts: timeout`.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }
}

/// How an `execute()` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    /// The producer succeeded; `data` was updated.
    Fetched,
    /// A fresh cached value was served without calling the producer.
    Cached,
    /// The retry engine gave up; `error` was set.
    Failed,
    /// Another `execute()` was already loading; nothing happened.
    Busy,
    /// `reset()` ran while this call was in flight; its result was dropped.
    Superseded,
}

/// Watch-backed state plus the reset epoch.
///
/// The epoch is only read and bumped inside watch modify closures, so epoch checks and state
/// writes are serialized by the channel's lock.
struct StateCell<T, E> {
    tx: watch::Sender<CallState<T, E>>,
    epoch: AtomicU64,
}

impl<T, E> StateCell<T, E> {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(CallState::default());
        Self { tx, epoch: AtomicU64::new(0) }
    }

    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch() == epoch
    }

    fn is_loading(&self) -> bool {
        self.tx.borrow().loading
    }

    /// Enter `Loading` unless already there. Returns the epoch the flight belongs to.
    fn begin(&self) -> Option<Flight<'_, T, E>> {
        let mut epoch = None;
        self.tx.send_if_modified(|s| {
            if s.loading {
                return false;
            }
            s.loading = true;
            s.error = None;
            epoch = Some(self.epoch());
            true
        });
        epoch.map(|epoch| Flight { cell: self, epoch, landed: false })
    }

    /// Record a cache hit unless a reset happened since `epoch` or another flight is loading.
    fn hit(&self, epoch: u64, value: T) -> Settled {
        let mut settled = Settled::Superseded;
        self.tx.send_if_modified(|s| {
            if !self.is_current(epoch) {
                return false;
            }
            if s.loading {
                settled = Settled::Busy;
                return false;
            }
            s.data = Some(value);
            s.error = None;
            settled = Settled::Cached;
            true
        });
        settled
    }

    fn reset(&self) {
        self.tx.send_modify(|s| {
            self.epoch.fetch_add(1, Ordering::SeqCst);
            *s = CallState::default();
        });
    }
}

/// One in-flight `execute()`. Clears `loading` if dropped before landing.
struct Flight<'a, T, E> {
    cell: &'a StateCell<T, E>,
    epoch: u64,
    landed: bool,
}

impl<T, E> Flight<'_, T, E> {
    fn is_current(&self) -> bool {
        self.cell.is_current(self.epoch)
    }

    fn land(mut self, result: Result<T, RetryError<E>>) -> Settled {
        self.landed = true;
        let epoch = self.epoch;
        let mut settled = Settled::Superseded;
        self.cell.tx.send_if_modified(|s| {
            if !self.cell.is_current(epoch) {
                return false;
            }
            match result {
                Ok(value) => {
                    s.data = Some(value);
                    s.error = None;
                    settled = Settled::Fetched;
                }
                Err(err) => {
                    s.error = Some(Arc::new(err));
                    settled = Settled::Failed;
                }
            }
            s.loading = false;
            true
        });
        if settled == Settled::Superseded {
            debug!(epoch, "call was reset while in flight; dropping result");
        }
        settled
    }
}

impl<T, E> Drop for Flight<'_, T, E> {
    fn drop(&mut self) {
        if self.landed {
            return;
        }
        let epoch = self.epoch;
        self.cell.tx.send_if_modified(|s| {
            if !self.cell.is_current(epoch) || !s.loading {
                return false;
            }
            s.loading = false;
            true
        });
    }
}

/// Retried remote call with observable state.
pub struct RetryCall<T, E, F> {
    cell: StateCell<T, E>,
    policy: RetryPolicy<E>,
    producer: F,
}

impl<T, E, F, Fut> RetryCall<T, E, F>
where
    E: std::error::Error + Send + Sync + 'static,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    pub fn new(policy: RetryPolicy<E>, producer: F) -> Self {
        Self { cell: StateCell::new(), policy, producer }
    }

    pub fn policy(&self) -> &RetryPolicy<E> {
        &self.policy
    }

    /// Run the producer under the retry policy and publish the outcome.
    pub async fn execute(&self) -> Settled {
        let Some(flight) = self.cell.begin() else {
            debug!("execute ignored; call already loading");
            return Settled::Busy;
        };
        let result = self.policy.execute(|| (self.producer)()).await;
        flight.land(result)
    }

    /// Back to `Idle`; any in-flight result is discarded.
    pub fn reset(&self) {
        self.cell.reset();
    }

    pub fn state(&self) -> CallState<T, E>
    where
        T: Clone,
    {
        self.cell.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CallState<T, E>> {
        self.cell.tx.subscribe()
    }
}

/// Retried remote call whose successful result is cached under `key`.
pub struct CachedCall<T, E, F, S, C = SystemClock> {
    cell: StateCell<T, E>,
    policy: RetryPolicy<E>,
    producer: F,
    cache: ResponseCache<S, C>,
    key: String,
}

impl<T, E, F, Fut, S, C> CachedCall<T, E, F, S, C>
where
    T: Serialize + DeserializeOwned,
    E: std::error::Error + Send + Sync + 'static,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    S: KvStore,
    C: Clock,
{
    pub fn new(
        key: impl Into<String>,
        cache: ResponseCache<S, C>,
        policy: RetryPolicy<E>,
        producer: F,
    ) -> Self {
        Self { cell: StateCell::new(), policy, producer, cache, key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn cache(&self) -> &ResponseCache<S, C> {
        &self.cache
    }

    /// Serve a fresh cached value, or fetch under the retry policy, cache and publish it.
    ///
    /// A failed fetch is published as an error even when a stale cached value exists.
    pub async fn execute(&self) -> Settled {
        if self.cell.is_loading() {
            debug!(key = %self.key, "execute ignored; call already loading");
            return Settled::Busy;
        }

        let epoch = self.cell.epoch();
        if let Some(entry) = self.cache.lookup::<T>(&self.key).await {
            return self.cell.hit(epoch, entry.value);
        }

        let Some(flight) = self.cell.begin() else {
            debug!(key = %self.key, "execute ignored; call already loading");
            return Settled::Busy;
        };
        let result = self.policy.execute(|| (self.producer)()).await;
        if let Ok(value) = &result {
            if flight.is_current() {
                self.cache.put_logged(&self.key, value).await;
            }
        }
        flight.land(result)
    }

    /// Back to `Idle` and delete the cached entry for this key.
    pub async fn reset(&self) {
        self.cell.reset();
        if let Err(err) = self.cache.invalidate(&self.key).await {
            warn!(key = %self.key, error = %err, "failed to delete cached entry on reset");
        }
    }

    pub fn state(&self) -> CallState<T, E>
    where
        T: Clone,
    {
        self.cell.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CallState<T, E>> {
        self.cell.tx.subscribe()
    }
}
