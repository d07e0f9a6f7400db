//! TTL response cache on top of a [`KvStore`].
//!
//! Each cached response occupies two string entries:
//! - `cache_<key>`: the JSON-serialized value
//! - `cache_<key>_time`: the write time, decimal milliseconds from the [`Clock`]
//!
//! An entry is fresh iff `now - stored_at < ttl`. Stale entries are never served (not even when
//! a refresh fails) and are simply overwritten by the next successful fetch. Entries that cannot
//! be read back (one half missing, bad timestamp, value of another shape) count as absent.

use crate::clock::{Clock, SystemClock};
use crate::error::{CacheError, RetryError};
use crate::retry::RetryPolicy;
use crate::store::KvStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Default freshness window: five minutes.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// A value read back from the store together with its write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry<T> {
    pub key: String,
    pub value: T,
    pub stored_at_ms: u64,
}

impl<T> CacheEntry<T> {
    /// Age at `now_ms`; a write time in the future counts as age zero.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.stored_at_ms)
    }

    pub fn is_fresh(&self, now_ms: u64, ttl: Duration) -> bool {
        self.age_ms(now_ms) < u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Where a value handed back by [`ResponseCache::get_or_fetch`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cache,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched<T> {
    pub value: T,
    pub source: Source,
}

pub(crate) fn value_key(key: &str) -> String {
    format!("cache_{key}")
}

pub(crate) fn time_key(key: &str) -> String {
    format!("cache_{key}_time")
}

/// Response cache with a fixed freshness window.
#[derive(Debug, Clone)]
pub struct ResponseCache<S, C = SystemClock> {
    store: S,
    clock: C,
    ttl: Duration,
}

impl<S: KvStore> ResponseCache<S, SystemClock> {
    pub fn new(store: S, ttl: Duration) -> Self {
        Self::with_clock(store, SystemClock, ttl)
    }
}

impl<S: KvStore, C: Clock> ResponseCache<S, C> {
    pub fn with_clock(store: S, clock: C, ttl: Duration) -> Self {
        Self { store, clock, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Read the stored entry for `key` regardless of its age.
    pub async fn read<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<CacheEntry<T>>, CacheError<S::Error>> {
        let raw = self.store.get(&value_key(key)).await.map_err(CacheError::Store)?;
        let time = self.store.get(&time_key(key)).await.map_err(CacheError::Store)?;
        let (Some(raw), Some(time)) = (raw, time) else {
            return Ok(None);
        };
        let Ok(stored_at_ms) = time.trim().parse::<u64>() else {
            warn!(key, time = %time, "ignoring cache entry with unreadable timestamp");
            return Ok(None);
        };
        let value = serde_json::from_str(&raw)?;
        Ok(Some(CacheEntry { key: key.to_string(), value, stored_at_ms }))
    }

    /// Fresh entry for `key`, if any. Store and decode failures are logged and read as a miss.
    pub async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        match self.read(key).await {
            Ok(Some(entry)) => {
                let now = self.clock.now_millis();
                if entry.is_fresh(now, self.ttl) {
                    debug!(key, age_ms = entry.age_ms(now), "cache hit");
                    Some(entry)
                } else {
                    debug!(key, age_ms = entry.age_ms(now), "cache entry stale");
                    None
                }
            }
            Ok(None) => {
                debug!(key, "cache miss");
                None
            }
            Err(err) => {
                warn!(key, error = %err, "cache read failed; treating as miss");
                None
            }
        }
    }

    /// Overwrite the entry for `key` with `value`, stamped now. Returns the timestamp written.
    pub async fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<u64, CacheError<S::Error>> {
        let raw = serde_json::to_string(value)?;
        let now = self.clock.now_millis();
        self.store.set(&value_key(key), raw).await.map_err(CacheError::Store)?;
        self.store.set(&time_key(key), now.to_string()).await.map_err(CacheError::Store)?;
        debug!(key, stored_at_ms = now, "cache entry written");
        Ok(now)
    }

    /// Delete both halves of the entry for `key`.
    pub async fn invalidate(&self, key: &str) -> Result<(), CacheError<S::Error>> {
        self.store.delete(&value_key(key)).await.map_err(CacheError::Store)?;
        self.store.delete(&time_key(key)).await.map_err(CacheError::Store)?;
        Ok(())
    }

    /// [`ResponseCache::put`] that logs instead of failing.
    pub(crate) async fn put_logged<T: Serialize>(&self, key: &str, value: &T) {
        if let Err(err) = self.put(key, value).await {
            warn!(key, error = %err, "failed to cache fetched value");
        }
    }

    /// Serve a fresh cached value or fetch through `policy` and cache the result.
    ///
    /// A failed fetch leaves the store untouched and is returned even if a stale value exists.
    pub async fn get_or_fetch<T, E, Fut, Op>(
        &self,
        key: &str,
        policy: &RetryPolicy<E>,
        operation: Op,
    ) -> Result<Fetched<T>, RetryError<E>>
    where
        T: Serialize + DeserializeOwned,
        E: std::error::Error + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>>,
        Op: FnMut() -> Fut,
    {
        if let Some(entry) = self.lookup::<T>(key).await {
            return Ok(Fetched { value: entry.value, source: Source::Cache });
        }
        let value = policy.execute(operation).await?;
        self.put_logged(key, &value).await;
        Ok(Fetched { value, source: Source::Remote })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use crate::InstantSleeper;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn cache(ttl_ms: u64) -> (ResponseCache<MemoryStore, ManualClock>, MemoryStore, ManualClock) {
        let store = MemoryStore::new();
        let clock = ManualClock::new(0);
        let cache =
            ResponseCache::with_clock(store.clone(), clock.clone(), Duration::from_millis(ttl_ms));
        (cache, store, clock)
    }

    fn policy() -> RetryPolicy<std::io::Error> {
        RetryPolicy::builder().max_attempts(2).with_sleeper(InstantSleeper).build().unwrap()
    }

    #[tokio::test]
    async fn put_uses_two_entry_layout() {
        let (cache, store, clock) = cache(1_000);
        clock.set(42);

        cache.put("surah:1", &vec![1, 2, 3]).await.unwrap();

        assert_eq!(store.get("cache_surah:1").await.unwrap().as_deref(), Some("[1,2,3]"));
        assert_eq!(store.get("cache_surah:1_time").await.unwrap().as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn freshness_boundary_is_exclusive() {
        let (cache, _store, clock) = cache(5_000);
        cache.put("k", &"v").await.unwrap();

        clock.set(4_999);
        assert!(cache.lookup::<String>("k").await.is_some());
        clock.set(5_000);
        assert!(cache.lookup::<String>("k").await.is_none());
    }

    #[tokio::test]
    async fn future_timestamp_counts_as_fresh() {
        let (cache, store, _clock) = cache(10);
        store.set("cache_k", "1".into()).await.unwrap();
        store.set("cache_k_time", "999999".into()).await.unwrap();
        assert_eq!(cache.lookup::<u32>("k").await.map(|e| e.value), Some(1));
    }

    #[tokio::test]
    async fn unreadable_entries_are_misses() {
        let (cache, store, _clock) = cache(10_000);

        store.set("cache_half", "1".into()).await.unwrap();
        assert!(cache.lookup::<u32>("half").await.is_none());

        store.set("cache_badtime", "1".into()).await.unwrap();
        store.set("cache_badtime_time", "yesterday".into()).await.unwrap();
        assert!(cache.lookup::<u32>("badtime").await.is_none());

        store.set("cache_shape", "\"text\"".into()).await.unwrap();
        store.set("cache_shape_time", "0".into()).await.unwrap();
        assert!(cache.lookup::<u32>("shape").await.is_none());
        assert!(matches!(cache.read::<u32>("shape").await, Err(CacheError::Codec(_))));
    }

    #[tokio::test]
    async fn invalidate_removes_both_entries() {
        let (cache, store, _clock) = cache(1_000);
        cache.put("k", &1u8).await.unwrap();
        cache.invalidate("k").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn get_or_fetch_serves_fresh_then_refetches_after_ttl() {
        let (cache, _store, clock) = cache(5_000);
        let calls = Arc::new(AtomicUsize::new(0));
        let fetch = || {
            let calls = calls.clone();
            async move { Ok::<_, std::io::Error>(calls.fetch_add(1, Ordering::SeqCst) + 1) }
        };

        let first = cache.get_or_fetch("n", &policy(), fetch).await.unwrap();
        assert_eq!(first, Fetched { value: 1, source: Source::Remote });

        clock.set(2_000);
        let second = cache.get_or_fetch("n", &policy(), fetch).await.unwrap();
        assert_eq!(second, Fetched { value: 1, source: Source::Cache });

        clock.set(6_000);
        let third = cache.get_or_fetch("n", &policy(), fetch).await.unwrap();
        assert_eq!(third, Fetched { value: 2, source: Source::Remote });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_refresh_does_not_serve_or_touch_stale_value() {
        let (cache, store, clock) = cache(1_000);
        cache.put("k", &7u32).await.unwrap();
        clock.set(10_000);

        let result = cache
            .get_or_fetch("k", &policy(), || async {
                Err::<u32, _>(std::io::Error::other("offline"))
            })
            .await;

        assert_eq!(result.unwrap_err().to_string(), "failed after 2 attempts: offline");
        assert_eq!(store.get("cache_k").await.unwrap().as_deref(), Some("7"));
        assert_eq!(store.get("cache_k_time").await.unwrap().as_deref(), Some("0"));
    }
}
