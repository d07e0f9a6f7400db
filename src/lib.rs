#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # pulse-retry
//!
//! Retrying remote-call executor for async Rust: the hardening layer between an application
//! and its hosted database or third-party HTTP APIs.
//!
//! ## Features
//!
//! - **Retry engine** with exponential backoff and additive jitter
//! - **Error classification** via a `should_retry` predicate, structured [`RetryError`]
//! - **Response cache** with a strict TTL over a pluggable [`KvStore`]
//! - **Observable call state** (`data` / `loading` / `error`) for UI bindings
//! - **Tower layer** to make any cloneable service retrying
//! - **Injectable time** ([`Clock`], [`Sleeper`]) for deterministic tests
//!
//! ## Quick Start
//!
//! ```rust
//! use pulse_retry::{RetryCall, RetryPolicy, Settled};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let policy = RetryPolicy::builder()
//!         .max_attempts(3)
//!         .base_delay(Duration::from_millis(10))
//!         .jitter_max(Duration::from_millis(10))
//!         .build()
//!         .unwrap();
//!
//!     let call = RetryCall::new(policy, || async {
//!         // Your remote call here
//!         Ok::<_, std::io::Error>("Al-Fatihah")
//!     });
//!
//!     assert_eq!(call.execute().await, Settled::Fetched);
//!     assert_eq!(call.state().data, Some("Al-Fatihah"));
//! }
//! ```

pub mod backoff;
pub mod cache;
pub mod call;
pub mod clock;
pub mod config;
pub mod error;
pub mod jitter;
pub mod layer;
pub mod prelude;
pub mod retry;
pub mod sleeper;
pub mod store;

// Re-exports
pub use backoff::Backoff;
pub use cache::{CacheEntry, Fetched, ResponseCache, Source};
pub use call::{CachedCall, CallState, Phase, RetryCall, Settled};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ExecutorConfig;
pub use error::{BuildError, CacheError, RetryError, StoreError};
pub use jitter::Jitter;
pub use layer::{RetryLayer, RetryService};
pub use retry::{RetryPolicy, RetryPolicyBuilder};
pub use sleeper::{ClockSleeper, InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use store::{FileStore, KvStore, MemoryStore};
