//! Time-bounded in-memory cache.
//!
//! Entries live in a sharded map of per-key async mutexes, so concurrent
//! lookups for different keys never block each other, and concurrent
//! lookups for the same key trigger at most one fetch. Failed fetches are
//! not stored.

use dashmap::DashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Cached value with its fetch time.
struct CacheEntry<V> {
    value: V,
    cached_at: Instant,
}

impl<V> CacheEntry<V> {
    /// An entry is fresh up to and including `ttl` after it was fetched.
    fn is_expired(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() > ttl
    }
}

type Slot<V> = Arc<Mutex<Option<CacheEntry<V>>>>;

/// Value returned by [`ResponseCache::get_or_try_fetch`].
#[derive(Debug, Clone)]
pub struct Lookup<V> {
    pub value: V,
    /// True when the value was served without calling the fetcher.
    pub hit: bool,
}

/// Keyed cache whose entries expire after a fixed TTL.
pub struct ResponseCache<K, V> {
    slots: DashMap<K, Slot<V>>,
    ttl: Duration,
}

impl<K, V> ResponseCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            ttl,
        }
    }

    /// Return the cached value for `key`, or run `fetch` and store its result.
    ///
    /// Callers racing on the same key wait for the first fetch to finish and
    /// then share its value. An `Err` from `fetch` is returned as-is and
    /// leaves the slot empty.
    pub async fn get_or_try_fetch<F, Fut, E>(&self, key: K, fetch: F) -> Result<Lookup<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        // Clone the slot out so no map shard lock is held across the await.
        let slot = self.slots.entry(key).or_default().value().clone();
        let mut guard = slot.lock().await;

        if let Some(entry) = guard.as_ref() {
            if !entry.is_expired(self.ttl) {
                return Ok(Lookup {
                    value: entry.value.clone(),
                    hit: true,
                });
            }
        }

        let value = fetch().await?;
        *guard = Some(CacheEntry {
            value: value.clone(),
            cached_at: Instant::now(),
        });
        Ok(Lookup { value, hit: false })
    }

    /// Fresh value for `key`, if any. Does not wait on an in-flight fetch.
    pub fn get(&self, key: &K) -> Option<V> {
        let slot = self.slots.get(key)?.value().clone();
        let guard = slot.try_lock().ok()?;
        guard
            .as_ref()
            .filter(|e| !e.is_expired(self.ttl))
            .map(|e| e.value.clone())
    }

    /// Drop expired entries. Slots with a fetch in flight are kept.
    pub fn cleanup_expired(&self) -> usize {
        let before = self.slots.len();
        let ttl = self.ttl;
        self.slots.retain(|_, slot| match slot.try_lock() {
            Ok(guard) => guard.as_ref().is_some_and(|e| !e.is_expired(ttl)),
            Err(_) => true,
        });
        before - self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    #[tokio::test(start_paused = true)]
    async fn test_hit_within_ttl() {
        let cache: ResponseCache<String, u32> = ResponseCache::new(DAY);
        let calls = AtomicUsize::new(0);
        let fetch = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ()>(7)
        };

        let first = cache.get_or_try_fetch("k".into(), fetch).await.unwrap();
        assert!(!first.hit);

        tokio::time::advance(DAY).await;
        let second = cache
            .get_or_try_fetch("k".into(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ()>(8)
            })
            .await
            .unwrap();
        assert!(second.hit);
        assert_eq!(second.value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refetch_after_expiry() {
        let cache: ResponseCache<&'static str, u32> = ResponseCache::new(DAY);
        cache
            .get_or_try_fetch("k", || async { Ok::<_, ()>(1) })
            .await
            .unwrap();

        tokio::time::advance(DAY + Duration::from_secs(1)).await;
        assert_eq!(cache.get(&"k"), None);

        let again = cache
            .get_or_try_fetch("k", || async { Ok::<_, ()>(2) })
            .await
            .unwrap();
        assert!(!again.hit);
        assert_eq!(again.value, 2);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache: ResponseCache<u8, u32> = ResponseCache::new(DAY);
        let err = cache
            .get_or_try_fetch(1, || async { Err::<u32, _>("boom") })
            .await;
        assert_eq!(err.unwrap_err(), "boom");
        assert_eq!(cache.get(&1), None);

        let ok = cache
            .get_or_try_fetch(1, || async { Ok::<_, &str>(5) })
            .await
            .unwrap();
        assert!(!ok.hit);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch() {
        let cache: Arc<ResponseCache<u8, u32>> = Arc::new(ResponseCache::new(DAY));
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    cache
                        .get_or_try_fetch(1, || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok::<_, ()>(42)
                        })
                        .await
                        .unwrap()
                        .value
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_expired() {
        let cache: ResponseCache<u8, u8> = ResponseCache::new(Duration::from_secs(10));
        cache.get_or_try_fetch(1, || async { Ok::<_, ()>(1) }).await.unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;
        cache.get_or_try_fetch(2, || async { Ok::<_, ()>(2) }).await.unwrap();

        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&2), Some(2));
    }
}
