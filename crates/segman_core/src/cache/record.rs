//! Segment record caches keyed by collection.

use crate::cache::lru::SizedLru;
use crate::segment::SegmentRecord;
use crate::types::CollectionId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;

/// Computes the size an entry counts against the cache capacity.
pub type SizeFn = Box<dyn Fn(CollectionId, &SegmentRecord) -> u64 + Send + Sync>;

/// Called once for every record evicted by capacity pressure.
pub type EvictionCallback = Box<dyn Fn(CollectionId, SegmentRecord) + Send + Sync>;

/// Caches the segment record of one scope for each collection.
///
/// Lookups in the system of record are idempotent, so two threads racing
/// on a miss may both `set`; the later write wins and nothing is lost.
pub trait SegmentRecordCache: Send + Sync {
    /// Returns the cached record and refreshes its recency.
    fn get(&self, collection: CollectionId) -> Option<SegmentRecord>;

    /// Caches a record. Bounded policies may evict other entries.
    fn set(&self, collection: CollectionId, record: SegmentRecord);

    /// Removes a record without invoking any eviction callback.
    fn pop(&self, collection: CollectionId) -> Option<SegmentRecord>;

    /// Returns true if the collection is cached.
    fn contains(&self, collection: CollectionId) -> bool;

    /// Returns the number of cached records.
    fn len(&self) -> usize;

    /// Returns true if nothing is cached.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes all records without invoking any eviction callback.
    fn reset(&self);
}

/// Unbounded record cache.
#[derive(Debug, Default)]
pub struct BasicRecordCache {
    records: Mutex<HashMap<CollectionId, SegmentRecord>>,
}

impl BasicRecordCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SegmentRecordCache for BasicRecordCache {
    fn get(&self, collection: CollectionId) -> Option<SegmentRecord> {
        self.records.lock().get(&collection).cloned()
    }

    fn set(&self, collection: CollectionId, record: SegmentRecord) {
        self.records.lock().insert(collection, record);
    }

    fn pop(&self, collection: CollectionId) -> Option<SegmentRecord> {
        self.records.lock().remove(&collection)
    }

    fn contains(&self, collection: CollectionId) -> bool {
        self.records.lock().contains_key(&collection)
    }

    fn len(&self) -> usize {
        self.records.lock().len()
    }

    fn reset(&self) {
        self.records.lock().clear();
    }
}

/// Record cache bounded by the summed size of its entries.
///
/// Each entry's size is computed once, when it is set. Eviction callbacks
/// run on the thread that called `set`, after the cache lock is released,
/// so a callback may call back into the cache.
pub struct LruRecordCache {
    records: Mutex<SizedLru<CollectionId, SegmentRecord>>,
    size_of: SizeFn,
    on_evict: Option<EvictionCallback>,
}

impl LruRecordCache {
    /// Creates a cache with a byte capacity and a size function.
    pub fn new(capacity: u64, size_of: SizeFn) -> Self {
        Self {
            records: Mutex::new(SizedLru::new(capacity)),
            size_of,
            on_evict: None,
        }
    }

    /// Sets the eviction callback.
    #[must_use]
    pub fn with_eviction_callback(mut self, on_evict: EvictionCallback) -> Self {
        self.on_evict = Some(on_evict);
        self
    }

    /// Returns the capacity.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.records.lock().capacity()
    }

    /// Returns the summed size of all cached entries.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.records.lock().total_size()
    }

    /// Returns cached collections from least to most recently used.
    #[must_use]
    pub fn collections_by_recency(&self) -> Vec<CollectionId> {
        self.records.lock().keys_by_recency()
    }
}

impl SegmentRecordCache for LruRecordCache {
    fn get(&self, collection: CollectionId) -> Option<SegmentRecord> {
        self.records.lock().get(&collection).cloned()
    }

    fn set(&self, collection: CollectionId, record: SegmentRecord) {
        let size = (self.size_of)(collection, &record);
        let evicted = self.records.lock().insert(collection, record, size);

        if let Some(on_evict) = &self.on_evict {
            for (collection, record) in evicted {
                on_evict(collection, record);
            }
        }
    }

    fn pop(&self, collection: CollectionId) -> Option<SegmentRecord> {
        self.records.lock().remove(&collection)
    }

    fn contains(&self, collection: CollectionId) -> bool {
        self.records.lock().contains(&collection)
    }

    fn len(&self) -> usize {
        self.records.lock().len()
    }

    fn reset(&self) {
        self.records.lock().clear();
    }
}

impl fmt::Debug for LruRecordCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let records = self.records.lock();
        f.debug_struct("LruRecordCache")
            .field("capacity", &records.capacity())
            .field("total_size", &records.total_size())
            .field("len", &records.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SegmentScope, SegmentType};
    use std::sync::Arc;

    fn record(collection: CollectionId) -> SegmentRecord {
        SegmentRecord::new(
            SegmentType::HnswLocalPersisted,
            SegmentScope::Vector,
            collection,
            None,
        )
    }

    fn sized(sizes: Arc<Mutex<HashMap<CollectionId, u64>>>) -> SizeFn {
        Box::new(move |c, _: &SegmentRecord| sizes.lock().get(&c).copied().unwrap_or(0))
    }

    #[test]
    fn basic_cache_never_evicts() {
        let cache = BasicRecordCache::new();
        let ids: Vec<_> = (0..100).map(|_| CollectionId::new()).collect();
        for id in &ids {
            cache.set(*id, record(*id));
        }
        assert_eq!(cache.len(), 100);

        assert!(cache.pop(ids[0]).is_some());
        assert!(!cache.contains(ids[0]));

        cache.reset();
        assert!(cache.is_empty());
    }

    #[test]
    fn lru_cache_evicts_with_callback() {
        let a = CollectionId::new();
        let b = CollectionId::new();
        let sizes = Arc::new(Mutex::new(HashMap::from([(a, 600), (b, 600)])));
        let evicted = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&evicted);
        let cache = LruRecordCache::new(1000, sized(sizes)).with_eviction_callback(Box::new(
            move |collection: CollectionId, _: SegmentRecord| sink.lock().push(collection),
        ));

        cache.set(a, record(a));
        assert!(evicted.lock().is_empty());

        cache.set(b, record(b));
        assert_eq!(*evicted.lock(), vec![a]);
        assert_eq!(cache.collections_by_recency(), vec![b]);
        assert_eq!(cache.total_size(), 600);
    }

    #[test]
    fn lru_pop_skips_callback() {
        let a = CollectionId::new();
        let calls = Arc::new(Mutex::new(0usize));

        let counter = Arc::clone(&calls);
        let cache = LruRecordCache::new(10, Box::new(|_, _: &SegmentRecord| 4))
            .with_eviction_callback(Box::new(move |_, _: SegmentRecord| *counter.lock() += 1));

        cache.set(a, record(a));
        assert!(cache.pop(a).is_some());
        cache.reset();
        assert_eq!(*calls.lock(), 0);
    }

    #[test]
    fn callback_may_reenter_cache() {
        let a = CollectionId::new();
        let b = CollectionId::new();
        let cache = Arc::new(Mutex::new(None::<Arc<LruRecordCache>>));

        let handle = Arc::clone(&cache);
        let lru = LruRecordCache::new(1, Box::new(|_, _: &SegmentRecord| 1)).with_eviction_callback(
            Box::new(move |collection: CollectionId, _: SegmentRecord| {
                if let Some(cache) = handle.lock().as_ref() {
                    assert!(!cache.contains(collection));
                }
            }),
        );
        let lru = Arc::new(lru);
        *cache.lock() = Some(Arc::clone(&lru));

        lru.set(a, record(a));
        lru.set(b, record(b));
        assert!(lru.contains(b));
        assert!(!lru.contains(a));
        cache.lock().take();
    }
}
