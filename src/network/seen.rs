//! Bounded duplicate-suppression caches
//!
//! Gossip dedup keys (message IDs, transaction IDs, block hashes) would
//! accumulate without bound on a long-lived node, so the cache keeps two
//! generations instead. Inserts land in the current generation; when it
//! fills to half the configured capacity it becomes the previous
//! generation and the one before it is dropped. A key inserted again
//! while still in the previous generation is promoted back into the
//! current one, so keys that keep circulating survive rotation while
//! stale ones age out.

use std::collections::HashSet;

/// Two-generation set with bounded memory
#[derive(Debug)]
pub struct SeenCache {
    half: usize,
    current: HashSet<String>,
    previous: HashSet<String>,
}

impl SeenCache {
    /// Creates a cache holding roughly `capacity` keys across both
    /// generations
    pub fn new(capacity: usize) -> Self {
        SeenCache {
            half: (capacity / 2).max(1),
            current: HashSet::new(),
            previous: HashSet::new(),
        }
    }

    /// Whether the key is present in either generation
    pub fn contains(&self, key: &str) -> bool {
        self.current.contains(key) || self.previous.contains(key)
    }

    /// Records the key in the current generation, rotating generations
    /// when the current one is full
    pub fn insert(&mut self, key: &str) {
        if self.current.contains(key) {
            return;
        }
        self.previous.remove(key);
        if self.current.len() >= self.half {
            self.previous = std::mem::take(&mut self.current);
        }
        self.current.insert(key.to_string());
    }

    /// Checks and records in one step; returns whether the key had been
    /// seen before
    pub fn observe(&mut self, key: &str) -> bool {
        let seen = self.contains(key);
        self.insert(key);
        seen
    }

    pub fn len(&self) -> usize {
        self.current.len() + self.previous.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty() && self.previous.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_reports_duplicates() {
        let mut cache = SeenCache::new(8);
        assert!(!cache.observe("a"));
        assert!(cache.observe("a"));
        assert!(cache.contains("a"));
    }

    #[test]
    fn test_rotation_drops_oldest_generation() {
        let mut cache = SeenCache::new(4);
        cache.insert("a");
        cache.insert("b");
        // Fills the current generation; "a" and "b" rotate out together
        cache.insert("c");
        assert!(cache.contains("a"));

        cache.insert("d");
        cache.insert("e");
        assert!(!cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert!(cache.contains("e"));
    }

    #[test]
    fn test_reinsertion_promotes_across_rotation() {
        let mut cache = SeenCache::new(4);
        cache.insert("a");
        cache.insert("b");
        cache.insert("c");
        // "a" sits in the previous generation; touching it promotes it
        cache.insert("a");

        cache.insert("d");
        cache.insert("e");
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
    }

    #[test]
    fn test_len_stays_bounded() {
        let mut cache = SeenCache::new(4);
        for i in 0..100 {
            cache.insert(&format!("key-{}", i));
        }
        assert!(cache.len() <= 4);
        // The latest key is always retained
        assert!(cache.contains("key-99"));
    }
}
