//! Segment records and the implementation contract.
//!
//! A segment is the unit of durable storage for one concern of one
//! collection. The manager never interprets segment contents; it only
//! knows the persisted [`SegmentRecord`] and drives the running
//! [`SegmentInstance`] through its lifecycle:
//!
//! ```text
//! prepared ─► persisted (sysdb) ─► started ─► stopped / deleted
//! ```
//!
//! Persistent vector instances additionally expose [`PersistentIndex`],
//! whose file handles can be closed and reopened while the instance stays
//! registered.

mod instance;
mod record;

pub use instance::{MetadataReader, PersistentIndex, SegmentHandle, SegmentInstance, VectorReader};
pub use record::{SegmentRecord, GRPC_URL_KEY};
