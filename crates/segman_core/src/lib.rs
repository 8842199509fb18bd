//! # Segman Core
//!
//! Segment lifecycle and cache management for collection storage.
//!
//! Every collection is stored as a small set of segments, one per
//! [`SegmentScope`]. This crate maps each collection to its segments,
//! builds and starts the segment implementations lazily on first use, and
//! keeps the running set within the process's memory and file-handle
//! budgets.
//!
//! ## Design Principles
//!
//! - The system of record ([`SysDb`]) is authoritative for which segments
//!   exist; the manager only reads it
//! - A segment has at most one running instance per manager
//! - Segment implementations are opaque; the manager drives their
//!   lifecycle and nothing else
//! - Segment types are registered explicitly at startup
//!
//! ## Managers
//!
//! - [`LocalSegmentManager`] - all segments run in this process
//! - [`DistributedSegmentManager`] - segments are proxies to remote workers
//!
//! ## Example
//!
//! ```rust,ignore
//! use segman_core::{Capability, Collection, LocalSegmentManager, ManagerConfig, SegmentManager};
//!
//! let manager = LocalSegmentManager::new(sysdb.clone(), &registry, ManagerConfig::new())?;
//! let collection = Collection::new("articles");
//! sysdb.create_segments(manager.prepare_segments_for_new_collection(&collection));
//!
//! let vectors = manager.get_segment(collection.id, Capability::VectorReader)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
mod config;
pub mod dir;
mod error;
mod manager;
pub mod registry;
mod routing;
pub mod segment;
mod stats;
mod sysdb;
mod types;

pub use config::{CachePolicy, ManagerConfig};
pub use error::{CoreError, CoreResult};
pub use manager::{
    capability_scope, select_known_segment, DistributedSegmentManager, LocalSegmentManager,
    SegmentManager, DEFAULT_PERSISTENT_INDEX_FILE_HANDLES,
};
pub use registry::{
    propagate_hnsw_params, propagate_persistent_hnsw_params, Placement, SegmentContext,
    SegmentFactory, SegmentTypeDescriptor, SegmentTypeRegistry,
};
pub use routing::{RendezvousHashDirectory, SegmentDirectory, DEFAULT_WORKER_PORT};
pub use segment::{
    MetadataReader, PersistentIndex, SegmentHandle, SegmentInstance, SegmentRecord, VectorReader,
    GRPC_URL_KEY,
};
pub use stats::{ManagerStats, StatsSnapshot};
pub use sysdb::{InMemorySysDb, SysDb};
pub use types::{
    Capability, Collection, CollectionId, Metadata, MetadataValue, Operation, SegmentId,
    SegmentScope, SegmentType,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
