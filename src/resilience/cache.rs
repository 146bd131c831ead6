use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct Entry<T> {
    value: T,
    expires_at: Instant,
}

/// Bounded in-memory cache with per-entry TTL
///
/// Expired entries are evicted lazily on read and never returned. When the
/// capacity is exceeded the oldest-inserted entry is evicted first: reads go
/// through `peek`, so the underlying LRU order stays pure insertion order.
/// Concurrent writes for the same key are last-writer-wins.
pub struct TtlCache<T> {
    store: Mutex<LruCache<String, Entry<T>>>,
    ttl: Duration,
}

impl<T: Clone + Send + 'static> TtlCache<T> {
    /// Creates a cache holding up to `capacity` entries for `ttl` each
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            store: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Retrieves a live value; expired or evicted keys are misses
    pub async fn get(&self, key: &str) -> Option<T> {
        let mut store = self.store.lock().await;
        match store.peek(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                store.pop(key);
                None
            }
            None => None,
        }
    }

    /// Stores a value under the key with the cache-wide TTL
    pub async fn insert(&self, key: &str, value: T) {
        let mut store = self.store.lock().await;
        store.put(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Number of stored entries, expired ones included until read
    pub async fn len(&self) -> usize {
        let store = self.store.lock().await;
        store.len()
    }

    /// Checks if the cache holds no entries
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_after_insert() {
        let cache: TtlCache<String> = TtlCache::new(10, Duration::from_secs(60));
        cache.insert("water", "aqua".to_string()).await;
        assert_eq!(cache.get("water").await, Some("aqua".to_string()));
        assert_eq!(cache.get("missing").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_a_miss() {
        let cache: TtlCache<u32> = TtlCache::new(10, Duration::from_secs(30));
        cache.insert("k", 1).await;

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(cache.get("k").await, None);
        // Lazy eviction removed it
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest_inserted() {
        let cache: TtlCache<u32> = TtlCache::new(2, Duration::from_secs(60));
        cache.insert("a", 1).await;
        cache.insert("b", 2).await;

        // Reading must not promote; "a" stays the eviction candidate
        assert_eq!(cache.get("a").await, Some(1));

        cache.insert("c", 3).await;
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.get("b").await, Some(2));
        assert_eq!(cache.get("c").await, Some(3));
    }

    #[tokio::test]
    async fn test_overwrite_is_last_writer_wins() {
        let cache: TtlCache<u32> = TtlCache::new(10, Duration::from_secs(60));
        cache.insert("k", 1).await;
        cache.insert("k", 2).await;
        assert_eq!(cache.get("k").await, Some(2));
        assert_eq!(cache.len().await, 1);
    }
}
