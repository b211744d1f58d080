// Generic TTL cache
//
// The template and parse caches are modeled as an explicit Cache<K, V> with
// an expiry check on every read, not as module-level mutable globals, so
// invalidation and testing stay explicit.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// In-memory cache whose entries expire `ttl` after insertion.
/// Expiry is checked on read; stale entries are dropped lazily.
pub struct Cache<K, V> {
    entries: HashMap<K, Entry<V>>,
    ttl: Duration,
}

impl<K: Eq + Hash + Clone, V: Clone> Cache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    /// Get a value if present and not expired. Expired entries are removed.
    pub fn get(&mut self, key: &K) -> Option<V> {
        match self.entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert or overwrite. Last writer wins, which is acceptable because
    /// re-deriving the same key's value is deterministic.
    pub fn put(&mut self, key: K, value: V) {
        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Explicitly drop one key
    pub fn invalidate(&mut self, key: &K) {
        self.entries.remove(key);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_get() {
        let mut cache: Cache<String, u32> = Cache::new(Duration::from_secs(60));
        cache.put("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"b".to_string()), None);
    }

    #[test]
    fn test_expired_entry_is_dropped_on_read() {
        let mut cache: Cache<String, u32> = Cache::new(Duration::from_millis(0));
        cache.put("a".to_string(), 1);
        // TTL of zero expires immediately
        assert_eq!(cache.get(&"a".to_string()), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_last_writer_wins() {
        let mut cache: Cache<String, u32> = Cache::new(Duration::from_secs(60));
        cache.put("a".to_string(), 1);
        cache.put("a".to_string(), 2);
        assert_eq!(cache.get(&"a".to_string()), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate() {
        let mut cache: Cache<String, u32> = Cache::new(Duration::from_secs(60));
        cache.put("a".to_string(), 1);
        cache.invalidate(&"a".to_string());
        assert_eq!(cache.get(&"a".to_string()), None);
    }
}
