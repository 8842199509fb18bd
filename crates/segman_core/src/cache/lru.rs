//! Size-weighted least-recently-used map.

use lru::LruCache;
use std::hash::Hash;

/// An LRU map bounded by the sum of per-entry sizes.
///
/// Recency is kept by an unbounded [`LruCache`]; this type enforces the
/// size budget on top of it. It is not synchronized: the caches built on
/// it wrap it in a mutex and run eviction callbacks after releasing that
/// mutex.
///
/// # Invariants
///
/// - `total_size` is the sum of the sizes of all entries
/// - after `insert` returns, `total_size <= capacity` unless the entry
///   just inserted is larger than the capacity on its own, in which case
///   it is the only entry left
#[derive(Debug)]
pub struct SizedLru<K: Hash + Eq, V> {
    capacity: u64,
    total_size: u64,
    entries: LruCache<K, (V, u64)>,
}

impl<K: Eq + Hash + Clone, V> SizedLru<K, V> {
    /// Creates an empty map with the given capacity.
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            total_size: 0,
            entries: LruCache::unbounded(),
        }
    }

    /// Returns the capacity.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Returns the summed size of all entries.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if the key is present. Does not touch recency.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains(key)
    }

    /// Returns the value and marks it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|(value, _)| value)
    }

    /// Returns the value without touching recency.
    #[must_use]
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.peek(key).map(|(value, _)| value)
    }

    /// Inserts or replaces an entry, marking it most recently used.
    ///
    /// Returns the entries evicted to get back under capacity, least
    /// recently used first. The entry just inserted is never evicted.
    pub fn insert(&mut self, key: K, value: V, size: u64) -> Vec<(K, V)> {
        if let Some((_, old_size)) = self.entries.put(key, (value, size)) {
            self.total_size -= old_size;
        }
        self.total_size += size;

        let mut evicted = Vec::new();
        while self.total_size > self.capacity && self.entries.len() > 1 {
            let Some((oldest, (value, size))) = self.entries.pop_lru() else {
                break;
            };
            self.total_size -= size;
            evicted.push((oldest, value));
        }
        evicted
    }

    /// Removes an entry. Removal is not an eviction.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let (value, size) = self.entries.pop(key)?;
        self.total_size -= size;
        Some(value)
    }

    /// Removes all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_size = 0;
    }

    /// Returns the keys from least to most recently used.
    #[must_use]
    pub fn keys_by_recency(&self) -> Vec<K> {
        self.entries.iter().rev().map(|(key, _)| key.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn evicts_oldest_when_over_capacity() {
        let mut lru = SizedLru::new(1000);
        assert!(lru.insert("a", 1, 600).is_empty());

        let evicted = lru.insert("b", 2, 600);
        assert_eq!(evicted, vec![("a", 1)]);
        assert_eq!(lru.total_size(), 600);
        assert_eq!(lru.keys_by_recency(), vec!["b"]);
    }

    #[test]
    fn get_refreshes_recency() {
        let mut lru = SizedLru::new(3);
        lru.insert("a", 1, 1);
        lru.insert("b", 2, 1);
        lru.insert("c", 3, 1);

        assert_eq!(lru.get(&"a"), Some(&1));
        let evicted = lru.insert("d", 4, 1);
        assert_eq!(evicted, vec![("b", 2)]);
        assert_eq!(lru.keys_by_recency(), vec!["c", "a", "d"]);
    }

    #[test]
    fn peek_does_not_refresh() {
        let mut lru = SizedLru::new(2);
        lru.insert("a", 1, 1);
        lru.insert("b", 2, 1);

        assert_eq!(lru.peek(&"a"), Some(&1));
        let evicted = lru.insert("c", 3, 1);
        assert_eq!(evicted, vec![("a", 1)]);
    }

    #[test]
    fn reinsert_replaces_size() {
        let mut lru = SizedLru::new(10);
        lru.insert("a", 1, 4);
        lru.insert("a", 2, 6);
        assert_eq!(lru.len(), 1);
        assert_eq!(lru.total_size(), 6);
        assert_eq!(lru.peek(&"a"), Some(&2));
    }

    #[test]
    fn oversized_entry_is_kept_alone() {
        let mut lru = SizedLru::new(5);
        lru.insert("a", 1, 2);
        lru.insert("b", 2, 2);

        let evicted = lru.insert("huge", 3, 50);
        assert_eq!(evicted, vec![("a", 1), ("b", 2)]);
        assert_eq!(lru.keys_by_recency(), vec!["huge"]);
        assert_eq!(lru.total_size(), 50);
    }

    #[test]
    fn remove_is_not_eviction() {
        let mut lru = SizedLru::new(10);
        lru.insert("a", 1, 5);
        assert_eq!(lru.remove(&"a"), Some(1));
        assert_eq!(lru.remove(&"a"), None);
        assert_eq!(lru.total_size(), 0);
        assert!(lru.is_empty());
    }

    proptest! {
        #[test]
        fn total_size_tracks_entries(
            ops in prop::collection::vec((0u8..8, 0u64..400, any::<bool>()), 1..64),
        ) {
            let mut lru = SizedLru::new(1000);
            for (key, size, remove) in ops {
                if remove {
                    lru.remove(&key);
                } else {
                    lru.insert(key, (), size);
                }
                let summed: u64 = lru.entries.iter().map(|(_, (_, size))| size).sum();
                prop_assert_eq!(lru.total_size(), summed);
                prop_assert_eq!(lru.keys_by_recency().len(), lru.len());
                prop_assert!(lru.total_size() <= 1000 || lru.len() == 1);
            }
        }

        #[test]
        fn evictions_follow_insertion_order(sizes in prop::collection::vec(1u64..500, 1..32)) {
            let mut lru = SizedLru::new(1000);
            let mut evicted_keys = Vec::new();
            for (key, size) in sizes.iter().enumerate() {
                for (k, _) in lru.insert(key, (), *size) {
                    evicted_keys.push(k);
                }
            }
            // Without reads, recency equals insertion order.
            let mut sorted = evicted_keys.clone();
            sorted.sort_unstable();
            prop_assert_eq!(&evicted_keys, &sorted);
            let survivors = lru.keys_by_recency();
            if let (Some(last_evicted), Some(first_alive)) =
                (evicted_keys.last(), survivors.first())
            {
                prop_assert!(last_evicted < first_alive);
            }
        }
    }
}
