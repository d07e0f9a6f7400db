//! Convenient re-exports for common pulse-retry types.
pub use crate::{
    backoff::{Backoff, MAX_BACKOFF},
    cache::{ResponseCache, DEFAULT_TTL},
    call::{CachedCall, CallState, Phase, RetryCall, Settled},
    config::{CacheConfig, ExecutorConfig, RetryConfig},
    error::{BuildError, RetryError},
    jitter::Jitter,
    layer::RetryLayer,
    retry::{RetryPolicy, RetryPolicyBuilder},
    store::{FileStore, KvStore, MemoryStore},
};
