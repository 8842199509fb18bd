//! Segment managers.
//!
//! A segment manager turns the persisted segment rows of a collection
//! into running instances and keeps them cached within the process's
//! resource limits.
//!
//! # Variants
//!
//! - [`LocalSegmentManager`]: every segment runs in this process; vector
//!   segments are bounded by a memory budget and persistent indexes by
//!   a file-handle budget
//! - [`DistributedSegmentManager`]: segments are thin proxies to remote
//!   workers; resource management belongs to the workers
//!
//! # Lookup path
//!
//! ```text
//! capability ─► scope ─► record cache ─(miss)─► sysdb ─► first known type
//!                              │
//!                              ▼
//!                  instance registry ─(miss)─► factory ─► start
//! ```

mod distributed;
mod local;

pub use distributed::DistributedSegmentManager;
pub use local::{LocalSegmentManager, DEFAULT_PERSISTENT_INDEX_FILE_HANDLES};

use crate::cache::{InstanceRegistry, SegmentRecordCache};
use crate::error::{CoreError, CoreResult};
use crate::registry::{SegmentContext, SegmentTypeRegistry};
use crate::segment::{SegmentHandle, SegmentRecord};
use crate::stats::ManagerStats;
use crate::sysdb::SysDb;
use crate::types::{
    Capability, Collection, CollectionId, Operation, SegmentId, SegmentScope, SegmentType,
};
use tracing::{debug, info, warn};

/// Contract shared by the local and distributed managers.
pub trait SegmentManager: Send + Sync {
    /// Builds one record per scope this deployment needs for a new
    /// collection. Nothing is persisted or started.
    fn prepare_segments_for_new_collection(&self, collection: &Collection) -> Vec<SegmentRecord>;

    /// Returns the running instance serving `capability` for a collection,
    /// loading and starting it on first use.
    ///
    /// # Errors
    ///
    /// - `SegmentNotFound` if no persisted segment of a known type exists
    /// - any error raised while building or starting the instance; in
    ///   that case nothing is registered
    fn get_segment(
        &self,
        collection: CollectionId,
        capability: Capability,
    ) -> CoreResult<SegmentHandle>;

    /// Like [`SegmentManager::get_segment`], with the capability given by
    /// name. An unknown name fails with `InvalidCapability` before any
    /// cache or the system of record is consulted.
    fn get_segment_by_name(
        &self,
        collection: CollectionId,
        capability: &str,
    ) -> CoreResult<SegmentHandle> {
        let capability = capability.parse::<Capability>()?;
        self.get_segment(collection, capability)
    }

    /// Tears down the running segments of a collection and forgets it.
    ///
    /// Returns the IDs of every persisted segment of the collection,
    /// including those that were not running.
    fn delete_segments(&self, collection: CollectionId) -> CoreResult<Vec<SegmentId>>;

    /// Hints that a collection is about to be used for `operation`.
    fn hint_use_collection(&self, collection: CollectionId, operation: Operation)
        -> CoreResult<()>;

    /// Starts every cached instance.
    fn start(&self) -> CoreResult<()>;

    /// Stops every cached instance.
    fn stop(&self) -> CoreResult<()>;

    /// Stops every cached instance and clears all caches.
    fn reset_state(&self) -> CoreResult<()>;

    /// Returns the manager's statistics.
    fn stats(&self) -> &ManagerStats;
}

/// Maps a caller-facing capability to the scope that serves it.
#[must_use]
pub fn capability_scope(capability: Capability) -> SegmentScope {
    match capability {
        Capability::MetadataReader => SegmentScope::Metadata,
        Capability::VectorReader => SegmentScope::Vector,
    }
}

/// Picks the first row of a type known to `registry`, in row order.
pub fn select_known_segment(
    rows: Vec<SegmentRecord>,
    collection: CollectionId,
    scope: SegmentScope,
    registry: &SegmentTypeRegistry,
) -> CoreResult<SegmentRecord> {
    rows.into_iter()
        .find(|row| row.scope() == scope && registry.is_known(row.segment_type()))
        .ok_or(CoreError::SegmentNotFound { collection, scope })
}

/// Builds a fresh record, propagating collection metadata when the type
/// registers a propagation function.
pub(crate) fn new_segment(
    registry: &SegmentTypeRegistry,
    segment_type: SegmentType,
    scope: SegmentScope,
    collection: &Collection,
) -> SegmentRecord {
    let metadata = registry.propagate(&segment_type, collection.metadata.as_ref());
    SegmentRecord::new(segment_type, scope, collection.id, metadata)
}

/// A record found in the scope cache or freshly read from the system of
/// record.
#[derive(Debug)]
pub(crate) enum Resolved {
    Cached(SegmentRecord),
    Fetched(SegmentRecord),
}

impl Resolved {
    fn record(&self) -> &SegmentRecord {
        match self {
            Self::Cached(record) | Self::Fetched(record) => record,
        }
    }
}

/// Returns the cached record for a scope, reading the system of record on
/// a miss. `prepare` runs on freshly fetched records. Fetched records are
/// not cached here; see [`load_segment`].
pub(crate) fn resolve_record<F>(
    cache: &dyn SegmentRecordCache,
    sysdb: &dyn SysDb,
    registry: &SegmentTypeRegistry,
    stats: &ManagerStats,
    collection: CollectionId,
    scope: SegmentScope,
    prepare: F,
) -> CoreResult<Resolved>
where
    F: FnOnce(SegmentRecord) -> CoreResult<SegmentRecord>,
{
    if let Some(record) = cache.get(collection) {
        stats.record_cache_hit();
        return Ok(Resolved::Cached(record));
    }

    stats.record_cache_miss();
    stats.record_sysdb_fetch();
    let rows = sysdb.get_segments(collection, Some(scope))?;
    let record = prepare(select_known_segment(rows, collection, scope, registry)?)?;
    debug!(
        collection = %collection,
        segment = %record.id(),
        scope = %scope,
        "resolved segment record"
    );
    Ok(Resolved::Fetched(record))
}

/// Starts the instance for a resolved record and reconciles the scope
/// cache with the outcome.
///
/// A fetched record is cached only once its instance is running, so a
/// failed start neither evicts other collections nor leaves a record
/// behind. A cached record whose instance fails to start is popped.
pub(crate) fn load_segment(
    cache: &dyn SegmentRecordCache,
    instances: &InstanceRegistry,
    registry: &SegmentTypeRegistry,
    context: &SegmentContext,
    stats: &ManagerStats,
    resolved: Resolved,
) -> CoreResult<SegmentHandle> {
    let collection = resolved.record().collection();
    match get_or_start(instances, registry, context, stats, resolved.record().clone()) {
        Ok(instance) => {
            if let Resolved::Fetched(record) = resolved {
                cache.set(collection, record);
            }
            Ok(instance)
        }
        Err(e) => {
            if let Resolved::Cached(_) = resolved {
                cache.pop(collection);
            }
            Err(e)
        }
    }
}

/// Returns the running instance for a record, building and starting it
/// under the registry lock if needed.
pub(crate) fn get_or_start(
    instances: &InstanceRegistry,
    registry: &SegmentTypeRegistry,
    context: &SegmentContext,
    stats: &ManagerStats,
    record: SegmentRecord,
) -> CoreResult<SegmentHandle> {
    let segment = record.id();
    let (instance, created) = instances.get_or_try_insert_with(segment, || {
        let instance = registry.instantiate(record, context)?;
        instance.start()?;
        Ok(instance)
    })?;

    if created {
        stats.record_instance_started();
        let record = instance.record();
        info!(
            collection = %record.collection(),
            segment = %segment,
            segment_type = %record.segment_type(),
            "started segment"
        );
    }
    Ok(instance)
}

/// Runs `op` on every instance, continuing past failures.
/// Returns the first failure.
pub(crate) fn for_each_instance<F>(instances: Vec<SegmentHandle>, op: F) -> CoreResult<()>
where
    F: Fn(&SegmentHandle) -> CoreResult<()>,
{
    let mut first_error = None;
    for instance in &instances {
        if let Err(e) = op(instance) {
            warn!(
                segment = %instance.record().id(),
                error = %e,
                "segment lifecycle call failed"
            );
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Placement, SegmentTypeDescriptor};
    use crate::segment::SegmentInstance;
    use std::sync::Arc;

    struct Inert(SegmentRecord);

    impl SegmentInstance for Inert {
        fn record(&self) -> &SegmentRecord {
            &self.0
        }

        fn start(&self) -> CoreResult<()> {
            Ok(())
        }

        fn stop(&self) -> CoreResult<()> {
            Ok(())
        }
    }

    fn registry() -> SegmentTypeRegistry {
        SegmentTypeRegistry::new().with(
            SegmentType::HnswLocalMemory,
            SegmentTypeDescriptor::new(Placement::InProcess, |record, _| {
                Ok(Arc::new(Inert(record)) as SegmentHandle)
            }),
        )
    }

    #[test]
    fn capability_maps_to_scope() {
        assert_eq!(capability_scope(Capability::VectorReader), SegmentScope::Vector);
        assert_eq!(capability_scope(Capability::MetadataReader), SegmentScope::Metadata);
    }

    #[test]
    fn selects_first_known_type() {
        let collection = CollectionId::new();
        let legacy = SegmentRecord::new(
            SegmentType::Other("legacy".into()),
            SegmentScope::Vector,
            collection,
            None,
        );
        let vector = || {
            SegmentRecord::new(SegmentType::HnswLocalMemory, SegmentScope::Vector, collection, None)
        };
        let first = vector();
        let second = vector();

        let selected = select_known_segment(
            vec![legacy, first.clone(), second],
            collection,
            SegmentScope::Vector,
            &registry(),
        )
        .unwrap();
        assert_eq!(selected, first);
    }

    #[test]
    fn no_known_type_is_typed_error() {
        let collection = CollectionId::new();
        let legacy = SegmentRecord::new(
            SegmentType::Other("legacy".into()),
            SegmentScope::Vector,
            collection,
            None,
        );

        let result =
            select_known_segment(vec![legacy], collection, SegmentScope::Vector, &registry());
        assert!(matches!(
            result,
            Err(CoreError::SegmentNotFound { scope: SegmentScope::Vector, .. })
        ));

        let empty =
            select_known_segment(Vec::new(), collection, SegmentScope::Metadata, &registry());
        assert!(matches!(empty, Err(CoreError::SegmentNotFound { .. })));
    }

    #[test]
    fn for_each_continues_after_failure() {
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let instances: Vec<SegmentHandle> = (0..3)
            .map(|_| {
                Arc::new(Inert(SegmentRecord::new(
                    SegmentType::HnswLocalMemory,
                    SegmentScope::Vector,
                    CollectionId::new(),
                    None,
                ))) as SegmentHandle
            })
            .collect();

        let result = for_each_instance(instances, |instance| {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Err(CoreError::instance_stop(instance.record().id(), "stuck"))
        });
        assert!(matches!(result, Err(CoreError::InstanceStop { .. })));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}
