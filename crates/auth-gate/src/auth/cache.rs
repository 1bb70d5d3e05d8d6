//! Key-set cache shared by every request.
//!
//! Holds at most one key set. Readers get either a complete, unexpired set or
//! nothing. Each `set` is stamped with a generation number so a request that
//! found a stale set can invalidate exactly that set, without clobbering a
//! newer one stored by a concurrent request.

use crate::auth::keyset::KeySet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Default key-set lifetime (1 hour). Provider rotation is infrequent and an
/// unknown kid forces a refresh anyway.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Snapshot of the cached key set.
#[derive(Debug, Clone)]
pub struct CachedKeySet {
    /// The keys themselves, shared with other readers.
    pub keys: Arc<KeySet>,

    /// Which `set` call produced this entry.
    pub generation: u64,

    /// When the set was stored.
    pub fetched_at: Instant,

    /// When this entry stops being served. `None` if the TTL overflowed.
    expires_at: Option<Instant>,
}

impl CachedKeySet {
    /// Time since the set was stored.
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |expires_at| expires_at > now)
    }
}

#[derive(Debug)]
struct CacheState {
    entry: Option<CachedKeySet>,
    next_generation: u64,
}

/// Thread-safe holder for the most recently fetched key set.
#[derive(Debug)]
pub struct KeySetCache {
    state: RwLock<CacheState>,
}

impl Default for KeySetCache {
    fn default() -> Self {
        Self::new()
    }
}

impl KeySetCache {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(CacheState {
                entry: None,
                next_generation: 1,
            }),
        }
    }

    /// Current key set, or `None` if empty, invalidated or expired.
    pub async fn get(&self) -> Option<CachedKeySet> {
        let state = self.state.read().await;
        state
            .entry
            .as_ref()
            .filter(|entry| entry.is_live(Instant::now()))
            .cloned()
    }

    /// Replace any cached set. Returns the new entry's generation.
    pub async fn set(&self, keys: KeySet, ttl: Duration) -> u64 {
        let mut state = self.state.write().await;
        let generation = state.next_generation;
        state.next_generation += 1;

        let fetched_at = Instant::now();
        state.entry = Some(CachedKeySet {
            keys: Arc::new(keys),
            generation,
            fetched_at,
            expires_at: fetched_at.checked_add(ttl),
        });

        generation
    }

    /// Drop the cached set unconditionally.
    pub async fn invalidate(&self) {
        self.state.write().await.entry = None;
    }

    /// Drop the cached set only if it is still `generation`.
    ///
    /// Returns whether an entry was dropped.
    pub async fn invalidate_generation(&self, generation: u64) -> bool {
        let mut state = self.state.write().await;
        match &state.entry {
            Some(entry) if entry.generation == generation => {
                state.entry = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::keyset::Jwk;

    fn key_set(kids: &[&str]) -> KeySet {
        KeySet::from_keys(
            kids.iter()
                .map(|kid| Jwk {
                    kty: "OKP".to_string(),
                    kid: (*kid).to_string(),
                    alg: "EdDSA".to_string(),
                    key_use: None,
                    n: None,
                    e: None,
                    crv: Some("Ed25519".to_string()),
                    x: Some("dGVzdA".to_string()),
                    y: None,
                })
                .collect(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_empty_cache_returns_none() {
        let cache = KeySetCache::new();
        assert!(cache.get().await.is_none());
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = KeySetCache::new();
        let generation = cache.set(key_set(&["a"]), DEFAULT_CACHE_TTL).await;

        let cached = cache.get().await.unwrap();
        assert_eq!(cached.generation, generation);
        assert!(cached.keys.contains("a"));
    }

    #[tokio::test]
    async fn test_age_tracks_time_since_set() {
        let cache = KeySetCache::new();
        let before = Instant::now();
        cache.set(key_set(&["a"]), DEFAULT_CACHE_TTL).await;

        let cached = cache.get().await.unwrap();
        assert!(cached.fetched_at >= before);
        assert!(cached.age() < Duration::from_secs(5));

        std::thread::sleep(Duration::from_millis(20));
        assert!(cached.age() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_set_replaces_whole_set() {
        let cache = KeySetCache::new();
        let first = cache.set(key_set(&["a", "b"]), DEFAULT_CACHE_TTL).await;
        let second = cache.set(key_set(&["c"]), DEFAULT_CACHE_TTL).await;

        assert!(second > first);
        let cached = cache.get().await.unwrap();
        assert!(!cached.keys.contains("a"), "sets are replaced, never merged");
        assert!(cached.keys.contains("c"));
    }

    #[tokio::test]
    async fn test_invalidate_ignores_remaining_ttl() {
        let cache = KeySetCache::new();
        cache.set(key_set(&["a"]), DEFAULT_CACHE_TTL).await;

        cache.invalidate().await;
        assert!(cache.get().await.is_none());

        // Idempotent
        cache.invalidate().await;
        assert!(cache.get().await.is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_not_returned() {
        let cache = KeySetCache::new();
        cache.set(key_set(&["a"]), Duration::ZERO).await;

        assert!(cache.get().await.is_none());
    }

    #[tokio::test]
    async fn test_huge_ttl_does_not_overflow() {
        let cache = KeySetCache::new();
        cache.set(key_set(&["a"]), Duration::MAX).await;

        assert!(cache.get().await.is_some());
    }

    #[tokio::test]
    async fn test_late_invalidate_does_not_clobber_newer_set() {
        let cache = KeySetCache::new();
        let stale = cache.set(key_set(&["old"]), DEFAULT_CACHE_TTL).await;
        let fresh = cache.set(key_set(&["new"]), DEFAULT_CACHE_TTL).await;

        // A request that observed the old set invalidates it after the refresh
        assert!(!cache.invalidate_generation(stale).await);

        let cached = cache.get().await.unwrap();
        assert_eq!(cached.generation, fresh);
        assert!(cached.keys.contains("new"));

        assert!(cache.invalidate_generation(fresh).await);
        assert!(cache.get().await.is_none());
        assert!(!cache.invalidate_generation(fresh).await);
    }

    #[tokio::test]
    async fn test_concurrent_readers_and_writers() {
        let cache = Arc::new(KeySetCache::new());
        let mut handles = Vec::new();

        for i in 0..16 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                if i % 4 == 0 {
                    cache.set(key_set(&["a", "b"]), DEFAULT_CACHE_TTL).await;
                } else if i % 4 == 1 {
                    cache.invalidate().await;
                } else if let Some(cached) = cache.get().await {
                    // Readers only ever see complete sets
                    assert_eq!(cached.keys.len(), 2);
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
    }
}
