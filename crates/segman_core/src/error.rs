//! Error types for segment management.

use crate::types::{CollectionId, SegmentId, SegmentScope};
use std::io;
use thiserror::Error;

/// Result type for segment manager operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while resolving, starting or tearing down segments.
#[derive(Debug, Error)]
pub enum CoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The requested capability does not map to a segment scope.
    #[error("invalid capability: {capability}")]
    InvalidCapability {
        /// The capability that was requested.
        capability: String,
    },

    /// The system of record holds no segment of a known type for the scope.
    #[error("no segment of a known type for collection {collection} in scope {scope}")]
    SegmentNotFound {
        /// The collection that was searched.
        collection: CollectionId,
        /// The scope that was searched.
        scope: SegmentScope,
    },

    /// The segment type has no registered implementation.
    #[error("unknown segment type: {segment_type}")]
    UnknownSegmentType {
        /// The unregistered type tag.
        segment_type: String,
    },

    /// A segment implementation failed to start.
    #[error("failed to start segment {segment_id}: {message}")]
    InstanceStart {
        /// The segment that failed.
        segment_id: SegmentId,
        /// Description of the failure.
        message: String,
    },

    /// A segment implementation failed to stop.
    #[error("failed to stop segment {segment_id}: {message}")]
    InstanceStop {
        /// The segment that failed.
        segment_id: SegmentId,
        /// Description of the failure.
        message: String,
    },

    /// A segment implementation failed to remove its durable state.
    #[error("failed to delete segment {segment_id}: {message}")]
    InstanceDelete {
        /// The segment that failed.
        segment_id: SegmentId,
        /// Description of the failure.
        message: String,
    },

    /// Opening or closing a persistent index failed.
    #[error("persistent index error on segment {segment_id}: {message}")]
    PersistentIndex {
        /// The segment whose index failed.
        segment_id: SegmentId,
        /// Description of the failure.
        message: String,
    },

    /// Deleting a collection's segments stopped part way through.
    ///
    /// Segments in `completed` were torn down; segments after `failed`
    /// were not attempted.
    #[error("delete stopped at segment {failed} after {} completed: {source}", .completed.len())]
    PartialDelete {
        /// Segments that were torn down before the failure.
        completed: Vec<SegmentId>,
        /// The segment whose teardown failed.
        failed: SegmentId,
        /// The underlying failure.
        #[source]
        source: Box<CoreError>,
    },

    /// A segment could not be mapped to a network endpoint.
    #[error("endpoint resolution failed: {message}")]
    EndpointResolution {
        /// Description of the failure.
        message: String,
    },

    /// The system of record failed.
    #[error("sysdb error: {message}")]
    SysDb {
        /// Description of the failure.
        message: String,
    },

    /// The manager configuration is not usable.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid capability error.
    pub fn invalid_capability(capability: impl Into<String>) -> Self {
        Self::InvalidCapability {
            capability: capability.into(),
        }
    }

    /// Creates an instance start error.
    pub fn instance_start(segment_id: SegmentId, message: impl Into<String>) -> Self {
        Self::InstanceStart {
            segment_id,
            message: message.into(),
        }
    }

    /// Creates an instance stop error.
    pub fn instance_stop(segment_id: SegmentId, message: impl Into<String>) -> Self {
        Self::InstanceStop {
            segment_id,
            message: message.into(),
        }
    }

    /// Creates an instance delete error.
    pub fn instance_delete(segment_id: SegmentId, message: impl Into<String>) -> Self {
        Self::InstanceDelete {
            segment_id,
            message: message.into(),
        }
    }

    /// Creates a persistent index error.
    pub fn persistent_index(segment_id: SegmentId, message: impl Into<String>) -> Self {
        Self::PersistentIndex {
            segment_id,
            message: message.into(),
        }
    }

    /// Creates an endpoint resolution error.
    pub fn endpoint_resolution(message: impl Into<String>) -> Self {
        Self::EndpointResolution {
            message: message.into(),
        }
    }

    /// Creates a sysdb error.
    pub fn sysdb(message: impl Into<String>) -> Self {
        Self::SysDb {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
