//! Segment type registry.
//!
//! Maps a [`SegmentType`] to the factory that builds its implementation and
//! to the function that derives segment metadata from collection metadata.
//! The table is filled by explicit registration at startup; there is no
//! lookup by name at runtime.

use crate::error::{CoreError, CoreResult};
use crate::segment::{SegmentHandle, SegmentRecord};
use crate::types::{Metadata, MetadataValue, SegmentType};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Prefix of collection metadata keys that configure HNSW indexes.
pub const HNSW_PREFIX: &str = "hnsw:";

/// Default number of records buffered before a persistent index is written.
pub const DEFAULT_HNSW_BATCH_SIZE: i64 = 100;

/// Default number of records between persistent index syncs.
pub const DEFAULT_HNSW_SYNC_THRESHOLD: i64 = 1000;

/// Environment handed to segment factories.
#[derive(Debug, Clone, Default)]
pub struct SegmentContext {
    /// Root directory under which persistent segments keep their files.
    pub persist_directory: Option<PathBuf>,
}

/// Builds a (not yet started) implementation for a segment record.
pub type SegmentFactory =
    Arc<dyn Fn(SegmentRecord, &SegmentContext) -> CoreResult<SegmentHandle> + Send + Sync>;

/// Derives segment metadata from collection metadata.
pub type PropagateFn = fn(&Metadata) -> Metadata;

/// Where a segment implementation does its work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// The implementation runs inside this process.
    InProcess,
    /// The implementation is a thin client forwarding to a remote worker.
    RemoteProxy,
}

/// Registration entry for one segment type.
#[derive(Clone)]
pub struct SegmentTypeDescriptor {
    placement: Placement,
    factory: SegmentFactory,
    propagate: Option<PropagateFn>,
    file_handles_per_instance: Option<usize>,
}

impl SegmentTypeDescriptor {
    /// Creates a descriptor with no metadata propagation.
    pub fn new<F>(placement: Placement, factory: F) -> Self
    where
        F: Fn(SegmentRecord, &SegmentContext) -> CoreResult<SegmentHandle> + Send + Sync + 'static,
    {
        Self {
            placement,
            factory: Arc::new(factory),
            propagate: None,
            file_handles_per_instance: None,
        }
    }

    /// Sets the metadata propagation function.
    #[must_use]
    pub fn with_propagation(mut self, propagate: PropagateFn) -> Self {
        self.propagate = Some(propagate);
        self
    }

    /// Declares how many file handles one open instance holds.
    #[must_use]
    pub fn with_file_handles(mut self, count: usize) -> Self {
        self.file_handles_per_instance = Some(count);
        self
    }

    /// Returns where the implementation runs.
    #[must_use]
    pub fn placement(&self) -> Placement {
        self.placement
    }

    /// Returns true if a propagation function is registered.
    #[must_use]
    pub fn propagates_metadata(&self) -> bool {
        self.propagate.is_some()
    }

    /// Returns the per-instance file handle cost, if declared.
    #[must_use]
    pub fn file_handles_per_instance(&self) -> Option<usize> {
        self.file_handles_per_instance
    }
}

impl fmt::Debug for SegmentTypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentTypeDescriptor")
            .field("placement", &self.placement)
            .field("propagates_metadata", &self.propagates_metadata())
            .field("file_handles_per_instance", &self.file_handles_per_instance)
            .finish_non_exhaustive()
    }
}

/// Table of segment types this process can instantiate.
#[derive(Debug, Clone, Default)]
pub struct SegmentTypeRegistry {
    types: HashMap<SegmentType, SegmentTypeDescriptor>,
}

impl SegmentTypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a segment type, returning the descriptor it replaced.
    pub fn register(
        &mut self,
        segment_type: SegmentType,
        descriptor: SegmentTypeDescriptor,
    ) -> Option<SegmentTypeDescriptor> {
        self.types.insert(segment_type, descriptor)
    }

    /// Registers a segment type, builder style.
    #[must_use]
    pub fn with(mut self, segment_type: SegmentType, descriptor: SegmentTypeDescriptor) -> Self {
        self.register(segment_type, descriptor);
        self
    }

    /// Returns a registry holding only the entries accepted by `keep`.
    #[must_use]
    pub fn restricted<F>(&self, keep: F) -> Self
    where
        F: Fn(&SegmentType, &SegmentTypeDescriptor) -> bool,
    {
        let types = self
            .types
            .iter()
            .filter(|(ty, desc)| keep(ty, desc))
            .map(|(ty, desc)| (ty.clone(), desc.clone()))
            .collect();
        Self { types }
    }

    /// Returns true if the type has a registered implementation.
    #[must_use]
    pub fn is_known(&self, segment_type: &SegmentType) -> bool {
        self.types.contains_key(segment_type)
    }

    /// Returns the descriptor for a type.
    #[must_use]
    pub fn descriptor(&self, segment_type: &SegmentType) -> Option<&SegmentTypeDescriptor> {
        self.types.get(segment_type)
    }

    /// Returns the number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Derives segment metadata for a new segment of `segment_type`.
    ///
    /// Returns `None` when the type has no propagation function. Types
    /// with one always receive a map, derived from an empty map when the
    /// collection carries no metadata.
    #[must_use]
    pub fn propagate(
        &self,
        segment_type: &SegmentType,
        collection_metadata: Option<&Metadata>,
    ) -> Option<Metadata> {
        let propagate = self.types.get(segment_type)?.propagate?;
        let empty = Metadata::new();
        Some(propagate(collection_metadata.unwrap_or(&empty)))
    }

    /// Builds the implementation for a record. The instance is not started.
    pub fn instantiate(
        &self,
        record: SegmentRecord,
        context: &SegmentContext,
    ) -> CoreResult<SegmentHandle> {
        let descriptor =
            self.types
                .get(record.segment_type())
                .ok_or_else(|| CoreError::UnknownSegmentType {
                    segment_type: record.segment_type().to_string(),
                })?;
        (descriptor.factory)(record, context)
    }
}

/// Keeps the `hnsw:*` keys of the collection metadata.
pub fn propagate_hnsw_params(collection_metadata: &Metadata) -> Metadata {
    collection_metadata
        .iter()
        .filter(|(key, _)| key.starts_with(HNSW_PREFIX))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Keeps the `hnsw:*` keys and fills in the persistence defaults.
pub fn propagate_persistent_hnsw_params(collection_metadata: &Metadata) -> Metadata {
    let mut metadata = propagate_hnsw_params(collection_metadata);
    metadata
        .entry("hnsw:batch_size".to_string())
        .or_insert(MetadataValue::Int(DEFAULT_HNSW_BATCH_SIZE));
    metadata
        .entry("hnsw:sync_threshold".to_string())
        .or_insert(MetadataValue::Int(DEFAULT_HNSW_SYNC_THRESHOLD));
    metadata
}
