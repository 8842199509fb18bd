//! Running segment implementation traits.

use crate::error::CoreResult;
use crate::segment::record::SegmentRecord;
use std::sync::Arc;

/// Shared handle to a running segment instance.
pub type SegmentHandle = Arc<dyn SegmentInstance>;

/// A live segment implementation holding open resources.
///
/// Instances are shared between request threads, so every method takes
/// `&self` and implementations use interior mutability.
///
/// # Invariants
///
/// - the manager calls `start` once, right after construction and before
///   the instance becomes visible to callers; a manager-wide `start` may
///   call it again after a `stop`
/// - `stop` releases in-memory and OS resources but keeps durable state
/// - `delete` removes durable state; it defaults to `stop` for backends
///   that have none
pub trait SegmentInstance: Send + Sync {
    /// Returns the record this instance was built from.
    fn record(&self) -> &SegmentRecord;

    /// Acquires the resources the segment needs to serve requests.
    fn start(&self) -> CoreResult<()>;

    /// Releases resources without removing durable state.
    fn stop(&self) -> CoreResult<()>;

    /// Releases resources and removes durable state.
    fn delete(&self) -> CoreResult<()> {
        self.stop()
    }

    /// Returns the persistent index view, for backends that keep an
    /// on-disk index with open file handles.
    fn as_persistent_index(&self) -> Option<&dyn PersistentIndex> {
        None
    }

    /// Returns the metadata reader view, if the segment serves one.
    fn as_metadata_reader(&self) -> Option<&dyn MetadataReader> {
        None
    }

    /// Returns the vector reader view, if the segment serves one.
    fn as_vector_reader(&self) -> Option<&dyn VectorReader> {
        None
    }
}

/// An on-disk index whose file handles can be released and reacquired.
pub trait PersistentIndex: Send + Sync {
    /// Number of file descriptors the index holds while open.
    fn file_handle_count(&self) -> usize;

    /// Opens the on-disk index. Opening an already open index is a no-op.
    fn open_persistent_index(&self) -> CoreResult<()>;

    /// Closes the on-disk index, releasing its file handles.
    fn close_persistent_index(&self) -> CoreResult<()>;

    /// Returns true while the index holds its file handles.
    fn is_open(&self) -> bool;
}

/// Read access to a collection's metadata index.
pub trait MetadataReader: Send + Sync {
    /// Number of records in the segment.
    fn count(&self) -> CoreResult<u64>;
}

/// Read access to a collection's vector index.
pub trait VectorReader: Send + Sync {
    /// Number of vectors in the segment.
    fn count(&self) -> CoreResult<u64>;

    /// Dimensionality of stored vectors, once the first vector is known.
    fn dimensionality(&self) -> CoreResult<Option<usize>>;
}
