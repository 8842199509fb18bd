//! Core type definitions for segment management.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier for a collection.
///
/// Collection IDs are assigned by the system of record when a collection
/// is created and never change afterwards.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(Uuid);

impl CollectionId {
    /// Creates a new random collection ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a collection ID from a UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CollectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CollectionId({})", self.0)
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for CollectionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Identifier for a segment.
///
/// Segment IDs are random UUIDs generated when the segment record is
/// prepared. They are never reused, so a segment ID uniquely names one
/// running instance.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(Uuid);

impl SegmentId {
    /// Creates a new random segment ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a segment ID from a UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SegmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SegmentId({})", self.0)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SegmentId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl FromStr for SegmentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// The storage concern a segment serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SegmentScope {
    /// Vector index.
    Vector,
    /// Metadata index.
    Metadata,
    /// Record log.
    Record,
}

impl SegmentScope {
    /// Returns the canonical upper-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vector => "VECTOR",
            Self::Metadata => "METADATA",
            Self::Record => "RECORD",
        }
    }
}

impl fmt::Display for SegmentScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concrete segment backend.
///
/// Rows in the system of record store the type as a string tag. Tags that
/// this build does not recognize load as [`SegmentType::Other`] so that
/// legacy rows can be skipped rather than failing the lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SegmentType {
    /// Sqlite-backed metadata index.
    Sqlite,
    /// In-memory HNSW vector index.
    HnswLocalMemory,
    /// HNSW vector index persisted to local disk.
    HnswLocalPersisted,
    /// HNSW vector index served by a remote worker.
    HnswDistributed,
    /// Block-file metadata index.
    BlockfileMetadata,
    /// Block-file record log.
    BlockfileRecord,
    /// A tag not known to this build.
    Other(String),
}

impl SegmentType {
    /// Returns the string tag stored in the system of record.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Sqlite => "sqlite-metadata",
            Self::HnswLocalMemory => "hnsw-local-memory",
            Self::HnswLocalPersisted => "hnsw-local-persisted",
            Self::HnswDistributed => "hnsw-distributed",
            Self::BlockfileMetadata => "blockfile-metadata",
            Self::BlockfileRecord => "blockfile-record",
            Self::Other(tag) => tag,
        }
    }

    /// Returns the scope a segment of this type serves, if known.
    #[must_use]
    pub fn scope(&self) -> Option<SegmentScope> {
        match self {
            Self::Sqlite | Self::BlockfileMetadata => Some(SegmentScope::Metadata),
            Self::HnswLocalMemory | Self::HnswLocalPersisted | Self::HnswDistributed => {
                Some(SegmentScope::Vector)
            }
            Self::BlockfileRecord => Some(SegmentScope::Record),
            Self::Other(_) => None,
        }
    }
}

impl From<&str> for SegmentType {
    fn from(tag: &str) -> Self {
        match tag {
            "sqlite-metadata" => Self::Sqlite,
            "hnsw-local-memory" => Self::HnswLocalMemory,
            "hnsw-local-persisted" => Self::HnswLocalPersisted,
            "hnsw-distributed" => Self::HnswDistributed,
            "blockfile-metadata" => Self::BlockfileMetadata,
            "blockfile-record" => Self::BlockfileRecord,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for SegmentType {
    fn from(tag: String) -> Self {
        Self::from(tag.as_str())
    }
}

impl From<SegmentType> for String {
    fn from(segment_type: SegmentType) -> Self {
        segment_type.as_str().to_string()
    }
}

impl fmt::Display for SegmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The caller-facing role a segment is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Read access to a collection's metadata index.
    MetadataReader,
    /// Read access to a collection's vector index.
    VectorReader,
}

impl Capability {
    /// Returns the caller-facing name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::MetadataReader => "MetadataReader",
            Self::VectorReader => "VectorReader",
        }
    }
}

impl FromStr for Capability {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MetadataReader" => Ok(Self::MetadataReader),
            "VectorReader" => Ok(Self::VectorReader),
            other => Err(CoreError::invalid_capability(other)),
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The kind of write a caller is about to perform on a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Inserting new records.
    Add,
    /// Updating existing records.
    Update,
    /// Inserting or updating records.
    Upsert,
    /// Deleting records.
    Delete,
}

/// A single metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// String value.
    Str(String),
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// Key-value metadata attached to collections and segments.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Descriptor of a collection, as handed to the manager at creation time.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    /// The collection ID.
    pub id: CollectionId,
    /// Human-readable name.
    pub name: String,
    /// Collection-level metadata.
    pub metadata: Option<Metadata>,
    /// Embedding dimensionality, once known.
    pub dimension: Option<u32>,
}

impl Collection {
    /// Creates a collection descriptor with a fresh ID and no metadata.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: CollectionId::new(),
            name: name.into(),
            metadata: None,
            dimension: None,
        }
    }

    /// Attaches collection metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Sets the embedding dimensionality.
    #[must_use]
    pub fn with_dimension(mut self, dimension: u32) -> Self {
        self.dimension = Some(dimension);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_id_parses_from_directory_name() {
        let id = SegmentId::new();
        assert_eq!(id.to_string().parse::<SegmentId>().unwrap(), id);
        assert!("index".parse::<SegmentId>().is_err());
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(SegmentId::new(), SegmentId::new());
        assert_ne!(CollectionId::new(), CollectionId::new());
    }

    #[test]
    fn segment_type_tags() {
        assert_eq!(SegmentType::from("hnsw-local-persisted"), SegmentType::HnswLocalPersisted);
        assert_eq!(SegmentType::Sqlite.as_str(), "sqlite-metadata");

        let legacy = SegmentType::from("urn:legacy/segment");
        assert_eq!(legacy, SegmentType::Other("urn:legacy/segment".into()));
        assert_eq!(legacy.scope(), None);
    }

    #[test]
    fn segment_type_scopes() {
        assert_eq!(SegmentType::Sqlite.scope(), Some(SegmentScope::Metadata));
        assert_eq!(SegmentType::HnswDistributed.scope(), Some(SegmentScope::Vector));
        assert_eq!(SegmentType::BlockfileRecord.scope(), Some(SegmentScope::Record));
    }

    #[test]
    fn capability_parse() {
        assert_eq!("VectorReader".parse::<Capability>().unwrap(), Capability::VectorReader);
        assert_eq!(
            "MetadataReader".parse::<Capability>().unwrap(),
            Capability::MetadataReader
        );

        let err = "not-a-capability".parse::<Capability>().unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidCapability { capability } if capability == "not-a-capability"
        ));
    }

    #[test]
    fn scope_display() {
        assert_eq!(format!("{}", SegmentScope::Metadata), "METADATA");
    }

    #[test]
    fn metadata_value_json_shape() {
        let mut metadata = Metadata::new();
        metadata.insert("hnsw:space".into(), "cosine".into());
        metadata.insert("hnsw:M".into(), 16i64.into());

        let json = serde_json::to_string(&metadata).unwrap();
        assert_eq!(json, r#"{"hnsw:M":16,"hnsw:space":"cosine"}"#);
    }
}
