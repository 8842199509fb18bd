//! Persisted segment description.

use crate::types::{CollectionId, Metadata, MetadataValue, SegmentId, SegmentScope, SegmentType};
use serde::{Deserialize, Serialize};

/// Metadata key holding the endpoint of a remotely served segment.
pub const GRPC_URL_KEY: &str = "grpc_url";

/// Immutable description of one segment.
///
/// A record is produced once, when its collection is created, and is then
/// persisted by the caller in the system of record. The manager never
/// rewrites a persisted row; endpoint injection produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRecord {
    id: SegmentId,
    #[serde(rename = "type")]
    segment_type: SegmentType,
    scope: SegmentScope,
    collection: CollectionId,
    metadata: Option<Metadata>,
}

impl SegmentRecord {
    /// Creates a record with a freshly generated segment ID.
    pub fn new(
        segment_type: SegmentType,
        scope: SegmentScope,
        collection: CollectionId,
        metadata: Option<Metadata>,
    ) -> Self {
        Self::from_parts(SegmentId::new(), segment_type, scope, collection, metadata)
    }

    /// Rebuilds a record from persisted parts.
    pub fn from_parts(
        id: SegmentId,
        segment_type: SegmentType,
        scope: SegmentScope,
        collection: CollectionId,
        metadata: Option<Metadata>,
    ) -> Self {
        Self {
            id,
            segment_type,
            scope,
            collection,
            metadata,
        }
    }

    /// Returns the segment ID.
    #[must_use]
    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// Returns the segment type.
    #[must_use]
    pub fn segment_type(&self) -> &SegmentType {
        &self.segment_type
    }

    /// Returns the scope the segment serves.
    #[must_use]
    pub fn scope(&self) -> SegmentScope {
        self.scope
    }

    /// Returns the owning collection.
    #[must_use]
    pub fn collection(&self) -> CollectionId {
        self.collection
    }

    /// Returns the type-specific metadata.
    #[must_use]
    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    /// Returns a metadata value by key.
    #[must_use]
    pub fn metadata_value(&self, key: &str) -> Option<&MetadataValue> {
        self.metadata.as_ref().and_then(|m| m.get(key))
    }

    /// Returns a copy of this record with one metadata entry set.
    #[must_use]
    pub fn with_metadata_entry(mut self, key: impl Into<String>, value: MetadataValue) -> Self {
        self.metadata
            .get_or_insert_with(Metadata::new)
            .insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_generates_fresh_ids() {
        let collection = CollectionId::new();
        let a = SegmentRecord::new(SegmentType::Sqlite, SegmentScope::Metadata, collection, None);
        let b = SegmentRecord::new(SegmentType::Sqlite, SegmentScope::Metadata, collection, None);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.collection(), b.collection());
    }

    #[test]
    fn with_metadata_entry_creates_map() {
        let record = SegmentRecord::new(
            SegmentType::HnswDistributed,
            SegmentScope::Vector,
            CollectionId::new(),
            None,
        );
        let id = record.id();

        let routed = record.with_metadata_entry(GRPC_URL_KEY, "worker-0:50051".into());
        assert_eq!(routed.id(), id);
        assert_eq!(
            routed.metadata_value(GRPC_URL_KEY),
            Some(&MetadataValue::Str("worker-0:50051".into()))
        );
    }

    #[test]
    fn serializes_type_as_tag() {
        let record = SegmentRecord::new(
            SegmentType::HnswLocalPersisted,
            SegmentScope::Vector,
            CollectionId::new(),
            None,
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "hnsw-local-persisted");
        assert_eq!(json["scope"], "VECTOR");

        let back: SegmentRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
