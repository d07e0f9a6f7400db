#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct RemoteError(pub String);

/// Remote call stand-in that fails a fixed number of times, then returns its call number.
#[derive(Clone)]
pub struct Flaky {
    calls: Arc<AtomicUsize>,
    failures: usize,
    message: &'static str,
}

impl Flaky {
    pub fn new(failures: usize, message: &'static str) -> Self {
        Self { calls: Arc::new(AtomicUsize::new(0)), failures, message }
    }

    pub fn always_failing(message: &'static str) -> Self {
        Self::new(usize::MAX, message)
    }

    pub fn healthy() -> Self {
        Self::new(0, "")
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn call(&self) -> impl Future<Output = Result<usize, RemoteError>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let failures = self.failures;
        let message = self.message;
        async move {
            if n <= failures {
                Err(RemoteError(message.to_string()))
            } else {
                Ok(n)
            }
        }
    }
}
