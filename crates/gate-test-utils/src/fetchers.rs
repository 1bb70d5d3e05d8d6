//! In-memory key-set fetchers.

use crate::crypto_fixtures::{key_set, TestKeypair};
use async_trait::async_trait;
use auth_gate::auth::{KeySet, KeySetFetcher};
use auth_gate::errors::FetchError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Fetcher serving a swappable response and counting how often it is called.
pub struct CountingFetcher {
    response: Mutex<Result<KeySet, FetchError>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl CountingFetcher {
    pub fn new(keys: &[&TestKeypair]) -> Self {
        Self {
            response: Mutex::new(Ok(key_set(keys))),
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Delay every fetch, so concurrent callers pile up behind it.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Publish `keys` on subsequent fetches.
    pub fn publish(&self, keys: &[&TestKeypair]) {
        *self.response.lock().unwrap() = Ok(key_set(keys));
    }

    /// Fail subsequent fetches with `error`.
    pub fn fail_with(&self, error: FetchError) {
        *self.response.lock().unwrap() = Err(error);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySetFetcher for CountingFetcher {
    async fn fetch(&self) -> Result<KeySet, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.response.lock().unwrap().clone()
    }
}
