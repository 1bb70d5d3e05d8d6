//! Key resolution with bounded refresh on unknown key IDs.
//!
//! The provider may rotate its key set at any moment, so a token signed with a
//! brand-new key can arrive while this process still caches the previous set.
//! Resolution therefore refreshes on a miss, invalidating the set that lacked
//! the key before each retry, and gives up after `MAX_FETCH_ATTEMPTS` fetches
//! so a bogus kid cannot cause a retry storm against the provider.
//!
//! Refreshes are single-flight: concurrent misses wait for the in-flight
//! fetch and reuse its result when it contains their key.

use crate::auth::cache::{KeySetCache, DEFAULT_CACHE_TTL};
use crate::auth::fetcher::KeySetFetcher;
use crate::auth::keyset::Jwk;
use crate::errors::AuthError;
use crate::observability::metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::instrument;

/// Fetches allowed per resolution: one refresh plus two retries.
pub const MAX_FETCH_ATTEMPTS: u32 = 3;

/// Resolves key IDs to signing keys through the shared cache.
pub struct KeyResolver {
    /// Shared key-set cache.
    cache: Arc<KeySetCache>,

    /// Source of fresh key sets.
    fetcher: Arc<dyn KeySetFetcher>,

    /// Lifetime of a fetched key set.
    cache_ttl: Duration,

    /// Upper bound on fetches per `resolve` call.
    max_fetch_attempts: u32,

    /// Serializes refreshes so concurrent misses share one fetch.
    refresh_lock: Mutex<()>,
}

impl KeyResolver {
    /// Create a resolver with the default TTL and retry bound.
    ///
    /// # Arguments
    ///
    /// * `cache` - Cache shared with anything else that inspects key state
    /// * `fetcher` - Source of key sets (HTTP in production)
    pub fn new(cache: Arc<KeySetCache>, fetcher: Arc<dyn KeySetFetcher>) -> Self {
        Self {
            cache,
            fetcher,
            cache_ttl: DEFAULT_CACHE_TTL,
            max_fetch_attempts: MAX_FETCH_ATTEMPTS,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Override how long a fetched key set is served.
    pub fn with_cache_ttl(mut self, cache_ttl: Duration) -> Self {
        self.cache_ttl = cache_ttl;
        self
    }

    /// Override the fetch bound. At least one fetch is always allowed.
    pub fn with_max_fetch_attempts(mut self, attempts: u32) -> Self {
        self.max_fetch_attempts = attempts.max(1);
        self
    }

    pub fn cache(&self) -> &Arc<KeySetCache> {
        &self.cache
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    /// Resolve `kid` to the matching signing keys.
    ///
    /// A cache hit returns without touching the network.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Fetch` as soon as a fetch fails, and
    /// `AuthError::KeyNotFound` once the fetch bound is exhausted.
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn resolve(&self, kid: &str) -> Result<Vec<Jwk>, AuthError> {
        // Fast path: cached, unexpired set containing the key
        let mut stale_generation = match self.cache.get().await {
            Some(cached) => {
                let keys = cached.keys.matching(kid);
                if !keys.is_empty() {
                    metrics::record_cache_lookup("hit");
                    tracing::debug!(target: "gate.auth.resolver", kid = %kid, "JWKS cache hit");
                    return Ok(keys);
                }
                metrics::record_cache_lookup("miss");
                tracing::debug!(
                    target: "gate.auth.resolver",
                    kid = %kid,
                    age_secs = cached.age().as_secs(),
                    "Key not found in JWKS cache"
                );
                Some(cached.generation)
            }
            None => {
                metrics::record_cache_lookup("empty");
                None
            }
        };

        for attempt in 1..=self.max_fetch_attempts {
            if let Some(generation) = stale_generation.take() {
                if self.cache.invalidate_generation(generation).await {
                    metrics::record_invalidation();
                    tracing::debug!(
                        target: "gate.auth.resolver",
                        generation,
                        "Invalidated key set missing kid"
                    );
                }
            }

            let _refresh = self.refresh_lock.lock().await;

            // A concurrent refresh may already have brought the key in
            if let Some(cached) = self.cache.get().await {
                let keys = cached.keys.matching(kid);
                if !keys.is_empty() {
                    tracing::debug!(
                        target: "gate.auth.resolver",
                        kid = %kid,
                        "Key found after concurrent refresh"
                    );
                    return Ok(keys);
                }
            }

            let key_set = self.fetcher.fetch().await.map_err(|e| {
                tracing::warn!(
                    target: "gate.auth.resolver",
                    error = %e,
                    attempt,
                    "Key set refresh failed"
                );
                AuthError::Fetch(e)
            })?;

            let keys = key_set.matching(kid);
            let key_count = key_set.len();
            let generation = self.cache.set(key_set, self.cache_ttl).await;

            tracing::info!(
                target: "gate.auth.resolver",
                key_count,
                generation,
                attempt,
                "JWKS cache refreshed"
            );

            if !keys.is_empty() {
                return Ok(keys);
            }

            tracing::debug!(
                target: "gate.auth.resolver",
                kid = %kid,
                attempt,
                "Key not found in refreshed key set"
            );

            // The freshest set stays cached after the final attempt
            if attempt < self.max_fetch_attempts {
                stale_generation = Some(generation);
            }
        }

        tracing::warn!(
            target: "gate.auth.resolver",
            kid = %kid,
            attempts = self.max_fetch_attempts,
            "Key not found in JWKS after refresh"
        );
        Err(AuthError::KeyNotFound {
            kid: kid.to_string(),
        })
    }
}
