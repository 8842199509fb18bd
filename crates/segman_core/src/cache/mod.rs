//! Caches layered over the system of record.
//!
//! Three tiers, from cold to hot:
//!
//! - the system of record holds persisted segment rows
//! - [`SegmentRecordCache`] keeps the selected row per collection and scope
//! - [`InstanceRegistry`] keeps the running implementation per segment
//!
//! [`FileHandleBudgetCache`] is a side tier for persistent vector indexes
//! that bounds open file handles independently of the other caches.
//!
//! The instance registry is authoritative. Record caches and the
//! file-handle cache are derived from it and are cleared after (or
//! together with) the registry, never before.

mod file_handle;
mod instances;
mod lru;
mod record;

pub use file_handle::FileHandleBudgetCache;
pub use instances::InstanceRegistry;
pub use lru::SizedLru;
pub use record::{
    BasicRecordCache, EvictionCallback, LruRecordCache, SegmentRecordCache, SizeFn,
};
