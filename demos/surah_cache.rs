//! Cached, retried fetch of a surah listing with observable call state.
use pulse_retry::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct ApiError(String);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let cfg = ExecutorConfig::from_json_str(
        r#"{ "retry": { "base_delay_ms": 200, "jitter_max_ms": 100 }, "cache": { "ttl_ms": 60000 } }"#,
    )?;
    let policy = cfg
        .retry
        .builder()
        .should_retry(|e: &ApiError| !e.0.starts_with("4"))
        .on_retry(|attempt, e| eprintln!("attempt {attempt} failed: {e}"))
        .build()?;
    let cache = ResponseCache::new(FileStore::new("pulse-cache.json"), cfg.cache.ttl());

    let calls = AtomicUsize::new(0);
    let surahs = CachedCall::new("surah:list", cache, policy, || {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if n == 0 {
                Err(ApiError("503 service unavailable".into()))
            } else {
                Ok(vec!["Al-Fatihah".to_string(), "Al-Baqarah".to_string()])
            }
        }
    });

    let settled = surahs.execute().await;
    let state = surahs.state();
    println!("{settled:?}: {:?} (phase {:?})", state.data, state.phase());
    Ok(())
}
