//! Serializable executor settings.
//!
//! Every field has a default, so partial documents are fine:
//!
//! ```rust
//! use pulse_retry::config::ExecutorConfig;
//! use std::time::Duration;
//!
//! let cfg = ExecutorConfig::from_json_str(r#"{ "retry": { "max_attempts": 5 } }"#).unwrap();
//! assert_eq!(cfg.retry.max_attempts, 5);
//! assert_eq!(cfg.retry.base_delay_ms, 1000);
//! assert_eq!(cfg.cache.ttl(), Duration::from_secs(300));
//! ```

use crate::cache::DEFAULT_TTL;
use crate::error::BuildError;
use crate::retry::{RetryPolicy, RetryPolicyBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid executor config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] BuildError),
}

/// Retry engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: usize,
    /// Delay after the first failure; doubles afterwards.
    pub base_delay_ms: u64,
    /// Exclusive upper bound of the random extra delay.
    pub jitter_max_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay_ms: 1000, jitter_max_ms: 1000 }
    }
}

impl RetryConfig {
    /// Builder preloaded with these settings; add a predicate, observer or sleeper as needed.
    pub fn builder<E>(&self) -> RetryPolicyBuilder<E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        RetryPolicy::builder()
            .max_attempts(self.max_attempts)
            .base_delay(Duration::from_millis(self.base_delay_ms))
            .jitter_max(Duration::from_millis(self.jitter_max_ms))
    }

    pub fn build_policy<E>(&self) -> Result<RetryPolicy<E>, BuildError>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.builder().build()
    }
}

/// Response cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_ms: DEFAULT_TTL.as_millis() as u64 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorConfig {
    pub retry: RetryConfig,
    pub cache: CacheConfig,
}

impl ExecutorConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), BuildError> {
        if self.retry.max_attempts == 0 {
            return Err(BuildError::InvalidMaxAttempts(0));
        }
        Ok(())
    }
}
