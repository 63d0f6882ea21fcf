//! Bounded cache with TTL and max-size eviction.
//!
//! Keeps the blacklist lookups and the deposit poller's seen-set from
//! growing without bound under long runtimes or adversarial event volume.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Bounded map cache: entries expire after the TTL, and when full the
/// oldest entry is evicted on insert.
pub struct BoundedTtlCache<K, V> {
    map: HashMap<K, (V, Instant)>,
    max_size: usize,
    ttl: Duration,
}

impl<K: Eq + Hash + Clone, V> BoundedTtlCache<K, V> {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            map: HashMap::new(),
            max_size,
            ttl,
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.map
            .get(key)
            .filter(|(_, t)| t.elapsed() < self.ttl)
            .map(|(v, _)| v)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    pub fn insert(&mut self, key: K, value: V) {
        let now = Instant::now();
        self.map.retain(|_, (_, t)| now.duration_since(*t) < self.ttl);
        while self.map.len() >= self.max_size && !self.map.is_empty() {
            let oldest = self
                .map
                .iter()
                .min_by_key(|(_, (_, t))| *t)
                .map(|(k, _)| k.clone());
            if let Some(k) = oldest {
                self.map.remove(&k);
            } else {
                break;
            }
        }
        self.map.insert(key, (value, now));
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut cache = BoundedTtlCache::new(10, Duration::from_secs(3600));
        assert!(!cache.contains_key(&"h1"));
        cache.insert("h1", 42);
        assert_eq!(cache.get(&"h1"), Some(&42));
    }

    #[test]
    fn test_evicts_oldest_at_capacity() {
        let mut cache = BoundedTtlCache::new(2, Duration::from_secs(3600));
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("c", 3);
        assert!(cache.get(&"a").is_none());
        assert_eq!(cache.get(&"c"), Some(&3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_ttl_expiry() {
        let mut cache = BoundedTtlCache::new(10, Duration::from_millis(0));
        cache.insert("a", 1);
        assert!(cache.get(&"a").is_none());
    }
}
