//! File-handle budget for persistent vector indexes.

use crate::cache::lru::SizedLru;
use crate::error::{CoreError, CoreResult};
use crate::segment::SegmentHandle;
use crate::types::CollectionId;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Bounds how many persistent vector indexes hold open file handles.
///
/// Eviction from this cache only closes the evicted index's files. The
/// instance itself stays registered and running, and tracking the same
/// collection again reopens its index.
pub struct FileHandleBudgetCache {
    entries: Mutex<SizedLru<CollectionId, SegmentHandle>>,
    budget: usize,
    handles_per_index: Option<usize>,
    undersized_tracks: AtomicU64,
}

impl FileHandleBudgetCache {
    /// Creates a cache that keeps at most `budget` indexes open.
    pub fn new(budget: usize) -> CoreResult<Self> {
        if budget == 0 {
            return Err(CoreError::invalid_config(
                "file handle budget must allow at least one open index",
            ));
        }
        Ok(Self {
            entries: Mutex::new(SizedLru::new(budget as u64)),
            budget,
            handles_per_index: None,
            undersized_tracks: AtomicU64::new(0),
        })
    }

    /// Creates a cache sized as `floor(handle_limit / handles_per_index)`.
    pub fn from_limits(handle_limit: u64, handles_per_index: usize) -> CoreResult<Self> {
        if handles_per_index == 0 {
            return Err(CoreError::invalid_config(
                "handles per persistent index must be positive",
            ));
        }
        let budget = handle_limit / handles_per_index as u64;
        let mut cache = Self::new(usize::try_from(budget).unwrap_or(usize::MAX))?;
        cache.handles_per_index = Some(handles_per_index);
        Ok(cache)
    }

    /// Returns the maximum number of simultaneously open indexes.
    #[must_use]
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Returns the per-index handle count the budget was sized with, if
    /// it was derived from a descriptor limit.
    #[must_use]
    pub fn handles_per_index(&self) -> Option<usize> {
        self.handles_per_index
    }

    /// Returns how many tracked indexes reported more file handles than
    /// the budget was sized for.
    #[must_use]
    pub fn undersized_tracks(&self) -> u64 {
        self.undersized_tracks.load(Ordering::Relaxed)
    }

    /// Opens the instance's persistent index and marks it most recently used.
    ///
    /// Returns the collections whose indexes were closed to stay within
    /// budget. A failure to close an evicted index is logged and does not
    /// fail this call.
    pub fn track(
        &self,
        collection: CollectionId,
        instance: SegmentHandle,
    ) -> CoreResult<Vec<CollectionId>> {
        let index = instance.as_persistent_index().ok_or_else(|| {
            CoreError::persistent_index(instance.record().id(), "segment has no persistent index")
        })?;
        index.open_persistent_index()?;

        let held = index.file_handle_count();
        if let Some(expected) = self.handles_per_index.filter(|expected| held > *expected) {
            self.undersized_tracks.fetch_add(1, Ordering::Relaxed);
            warn!(
                collection = %collection,
                segment = %instance.record().id(),
                held,
                expected,
                "persistent index holds more file handles than budgeted"
            );
        }

        let evicted = self
            .entries
            .lock()
            .insert(collection, Arc::clone(&instance), 1);

        let mut closed = Vec::with_capacity(evicted.len());
        for (evicted_collection, evicted_instance) in evicted {
            if let Some(index) = evicted_instance.as_persistent_index() {
                let segment = evicted_instance.record().id();
                match index.close_persistent_index() {
                    Ok(()) => debug!(
                        collection = %evicted_collection,
                        segment = %segment,
                        "closed persistent index"
                    ),
                    Err(e) => warn!(
                        collection = %evicted_collection,
                        segment = %segment,
                        error = %e,
                        "failed to close persistent index"
                    ),
                }
            }
            closed.push(evicted_collection);
        }
        Ok(closed)
    }

    /// Stops tracking a collection without closing its index.
    pub fn pop(&self, collection: CollectionId) -> Option<SegmentHandle> {
        self.entries.lock().remove(&collection)
    }

    /// Returns true if the collection's index is tracked as open.
    #[must_use]
    pub fn contains(&self, collection: CollectionId) -> bool {
        self.entries.lock().contains(&collection)
    }

    /// Returns the number of tracked indexes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Returns tracked collections from least to most recently used.
    #[must_use]
    pub fn collections_by_recency(&self) -> Vec<CollectionId> {
        self.entries.lock().keys_by_recency()
    }

    /// Forgets every tracked index without closing any.
    pub fn reset(&self) {
        self.entries.lock().clear();
    }
}

impl fmt::Debug for FileHandleBudgetCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandleBudgetCache")
            .field("budget", &self.budget)
            .field("len", &self.len())
            .finish()
    }
}
