//! System of record interface.

use crate::error::CoreResult;
use crate::segment::SegmentRecord;
use crate::types::{CollectionId, SegmentScope};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Authoritative store of persisted segment rows.
///
/// The manager only reads from the system of record. Records returned by
/// `prepare_segments_for_new_collection` are persisted by the caller.
pub trait SysDb: Send + Sync {
    /// Returns the segments of a collection, optionally filtered by scope.
    ///
    /// Rows come back in a stable order; the manager selects the first
    /// row of a known type.
    fn get_segments(
        &self,
        collection: CollectionId,
        scope: Option<SegmentScope>,
    ) -> CoreResult<Vec<SegmentRecord>>;
}

/// In-memory system of record for tests and single-process deployments.
///
/// Rows are returned in insertion order.
#[derive(Debug, Default)]
pub struct InMemorySysDb {
    rows: RwLock<Vec<SegmentRecord>>,
    fetches: AtomicU64,
}

impl InMemorySysDb {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Persists segment rows.
    pub fn create_segments(&self, records: impl IntoIterator<Item = SegmentRecord>) {
        self.rows.write().extend(records);
    }

    /// Removes every row of a collection, returning how many were removed.
    pub fn delete_segments(&self, collection: CollectionId) -> usize {
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|row| row.collection() != collection);
        before - rows.len()
    }

    /// Returns the number of `get_segments` calls served.
    #[must_use]
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Returns the total number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Returns true if no rows are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

impl SysDb for InMemorySysDb {
    fn get_segments(
        &self,
        collection: CollectionId,
        scope: Option<SegmentScope>,
    ) -> CoreResult<Vec<SegmentRecord>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .rows
            .read()
            .iter()
            .filter(|row| row.collection() == collection)
            .filter(|row| scope.map_or(true, |s| row.scope() == s))
            .cloned()
            .collect())
    }
}
