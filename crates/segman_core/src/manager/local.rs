//! Single-process segment manager.

use super::{
    capability_scope, for_each_instance, load_segment, new_segment, resolve_record, SegmentManager,
};
use crate::cache::{
    BasicRecordCache, FileHandleBudgetCache, InstanceRegistry, LruRecordCache, SegmentRecordCache,
};
use crate::config::ManagerConfig;
use crate::dir::{directory_size, segment_directory};
use crate::error::{CoreError, CoreResult};
use crate::registry::{Placement, SegmentContext, SegmentTypeRegistry};
use crate::segment::{SegmentHandle, SegmentRecord};
use crate::stats::ManagerStats;
use crate::sysdb::SysDb;
use crate::types::{
    Capability, Collection, CollectionId, Operation, SegmentId, SegmentScope, SegmentType,
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// File handles a persistent vector index holds when neither the
/// configuration nor the registered type declares a count.
pub const DEFAULT_PERSISTENT_INDEX_FILE_HANDLES: usize = 4;

/// Segment manager running every segment inside this process.
///
/// Metadata records are cached without bound. Vector records are bounded by
/// the on-disk size of their segment directories when the configuration
/// selects the LRU policy with a positive budget; evicting a record stops
/// and unregisters its instance. In persistent deployments a second budget
/// bounds how many persistent indexes hold open file handles at once.
pub struct LocalSegmentManager {
    sysdb: Arc<dyn SysDb>,
    registry: SegmentTypeRegistry,
    config: ManagerConfig,
    context: SegmentContext,
    instances: Arc<InstanceRegistry>,
    metadata_records: BasicRecordCache,
    vector_records: Box<dyn SegmentRecordCache>,
    file_handles: Option<Arc<FileHandleBudgetCache>>,
    stats: Arc<ManagerStats>,
}

impl LocalSegmentManager {
    /// Creates a manager over `sysdb`.
    ///
    /// Only in-process types of `registry` are used.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration is invalid or the
    /// file-handle budget works out to zero.
    pub fn new(
        sysdb: Arc<dyn SysDb>,
        registry: &SegmentTypeRegistry,
        config: ManagerConfig,
    ) -> CoreResult<Self> {
        config.validate()?;

        let registry = registry.restricted(|_, desc| desc.placement() == Placement::InProcess);
        let context = SegmentContext {
            persist_directory: config.persist_directory.clone(),
        };
        let instances = Arc::new(InstanceRegistry::new());
        let stats = Arc::new(ManagerStats::new());

        let file_handles = if config.is_persistent() {
            let per_index = config
                .handles_per_persistent_index
                .or_else(|| {
                    registry
                        .descriptor(&SegmentType::HnswLocalPersisted)
                        .and_then(|desc| desc.file_handles_per_instance())
                })
                .unwrap_or(DEFAULT_PERSISTENT_INDEX_FILE_HANDLES);
            let cache = FileHandleBudgetCache::from_limits(config.file_handle_limit(), per_index)?;
            info!(
                budget = cache.budget(),
                handles_per_index = per_index,
                "file handle budget configured"
            );
            Some(Arc::new(cache))
        } else {
            None
        };

        let vector_records: Box<dyn SegmentRecordCache> = if config.uses_memory_budget() {
            let persist = config.persist_directory.clone();
            let evicted_instances = Arc::clone(&instances);
            let evicted_handles = file_handles.clone();
            let evicted_stats = Arc::clone(&stats);

            let cache = LruRecordCache::new(
                config.memory_limit_bytes,
                Box::new(move |_, record: &SegmentRecord| {
                    segment_disk_size(persist.as_deref(), record)
                }),
            )
            .with_eviction_callback(Box::new(
                move |collection: CollectionId, record: SegmentRecord| {
                    evict_instance(
                        &evicted_instances,
                        evicted_handles.as_deref(),
                        &evicted_stats,
                        collection,
                        &record,
                    );
                },
            ));
            info!(
                memory_limit_bytes = config.memory_limit_bytes,
                "vector segments bounded by memory budget"
            );
            Box::new(cache)
        } else {
            Box::new(BasicRecordCache::new())
        };

        Ok(Self {
            sysdb,
            registry,
            config,
            context,
            instances,
            metadata_records: BasicRecordCache::new(),
            vector_records,
            file_handles,
            stats,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Returns the segment types this manager can serve.
    #[must_use]
    pub fn registry(&self) -> &SegmentTypeRegistry {
        &self.registry
    }

    /// Returns the file-handle budget, present only when persistent.
    #[must_use]
    pub fn file_handle_cache(&self) -> Option<&FileHandleBudgetCache> {
        self.file_handles.as_deref()
    }

    /// Returns true if the segment has a running instance.
    #[must_use]
    pub fn is_running(&self, segment: SegmentId) -> bool {
        self.instances.contains(segment)
    }

    /// Returns the number of running instances.
    #[must_use]
    pub fn running_instances(&self) -> usize {
        self.instances.len()
    }

    /// Returns true if a record of `scope` is cached for the collection.
    #[must_use]
    pub fn is_cached(&self, collection: CollectionId, scope: SegmentScope) -> bool {
        match scope {
            SegmentScope::Metadata => self.metadata_records.contains(collection),
            SegmentScope::Vector => self.vector_records.contains(collection),
            SegmentScope::Record => false,
        }
    }

    fn vector_type(&self) -> SegmentType {
        if self.config.is_persistent() {
            SegmentType::HnswLocalPersisted
        } else {
            SegmentType::HnswLocalMemory
        }
    }

    fn records(&self, scope: SegmentScope) -> &dyn SegmentRecordCache {
        match scope {
            SegmentScope::Vector => self.vector_records.as_ref(),
            _ => &self.metadata_records,
        }
    }

    fn track_open_index(
        &self,
        collection: CollectionId,
        instance: SegmentHandle,
    ) -> CoreResult<()> {
        let Some(file_handles) = &self.file_handles else {
            return Ok(());
        };
        if instance.as_persistent_index().is_none() {
            return Ok(());
        }
        let closed = file_handles.track(collection, instance)?;
        if !closed.is_empty() {
            self.stats.record_file_handle_evictions(closed.len() as u64);
        }
        Ok(())
    }
}

impl SegmentManager for LocalSegmentManager {
    fn prepare_segments_for_new_collection(&self, collection: &Collection) -> Vec<SegmentRecord> {
        vec![
            new_segment(&self.registry, self.vector_type(), SegmentScope::Vector, collection),
            new_segment(&self.registry, SegmentType::Sqlite, SegmentScope::Metadata, collection),
        ]
    }

    fn get_segment(
        &self,
        collection: CollectionId,
        capability: Capability,
    ) -> CoreResult<SegmentHandle> {
        let scope = capability_scope(capability);
        let cache = self.records(scope);
        let resolved = resolve_record(
            cache,
            self.sysdb.as_ref(),
            &self.registry,
            &self.stats,
            collection,
            scope,
            Ok,
        )?;
        load_segment(cache, &self.instances, &self.registry, &self.context, &self.stats, resolved)
    }

    fn delete_segments(&self, collection: CollectionId) -> CoreResult<Vec<SegmentId>> {
        self.stats.record_sysdb_fetch();
        let rows = self.sysdb.get_segments(collection, None)?;
        let ids: Vec<SegmentId> = rows.iter().map(SegmentRecord::id).collect();

        let mut completed = Vec::new();
        let mut failure = None;
        for id in &ids {
            let Some(instance) = self.instances.remove(*id) else {
                continue;
            };
            if let Err(e) = instance.delete() {
                warn!(collection = %collection, segment = %id, error = %e, "segment delete failed");
                failure = Some((*id, e));
                break;
            }
            self.stats.record_segment_deleted();
            completed.push(*id);
        }

        self.vector_records.pop(collection);
        self.metadata_records.pop(collection);
        if let Some(file_handles) = &self.file_handles {
            file_handles.pop(collection);
        }

        if let Some((failed, source)) = failure {
            return Err(CoreError::PartialDelete {
                completed,
                failed,
                source: Box::new(source),
            });
        }

        info!(collection = %collection, segments = ids.len(), "deleted collection segments");
        Ok(ids)
    }

    fn hint_use_collection(
        &self,
        collection: CollectionId,
        operation: Operation,
    ) -> CoreResult<()> {
        debug!(collection = %collection, operation = ?operation, "warming collection");
        self.get_segment(collection, Capability::MetadataReader)?;
        let vector = self.get_segment(collection, Capability::VectorReader)?;
        self.track_open_index(collection, vector)
    }

    fn start(&self) -> CoreResult<()> {
        for_each_instance(self.instances.snapshot(), |instance| instance.start())
    }

    fn stop(&self) -> CoreResult<()> {
        for_each_instance(self.instances.snapshot(), |instance| instance.stop())
    }

    fn reset_state(&self) -> CoreResult<()> {
        let drained = self.instances.drain();
        self.vector_records.reset();
        self.metadata_records.reset();
        if let Some(file_handles) = &self.file_handles {
            file_handles.reset();
        }
        info!(instances = drained.len(), "reset segment manager state");
        for_each_instance(drained, |instance| instance.stop())
    }

    fn stats(&self) -> &ManagerStats {
        &self.stats
    }
}

impl fmt::Debug for LocalSegmentManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSegmentManager")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("instances", &self.instances)
            .field("file_handles", &self.file_handles)
            .finish_non_exhaustive()
    }
}

/// On-disk size of a vector segment; zero when nothing is persisted.
fn segment_disk_size(persist_directory: Option<&Path>, record: &SegmentRecord) -> u64 {
    let Some(root) = persist_directory else {
        return 0;
    };
    let path: PathBuf = segment_directory(root, record.id());
    match directory_size(&path) {
        Ok(size) => size,
        Err(e) => {
            warn!(
                segment = %record.id(),
                path = %path.display(),
                error = %e,
                "failed to size segment directory"
            );
            0
        }
    }
}

/// Tears down the instance behind a record evicted for memory.
fn evict_instance(
    instances: &InstanceRegistry,
    file_handles: Option<&FileHandleBudgetCache>,
    stats: &ManagerStats,
    collection: CollectionId,
    record: &SegmentRecord,
) {
    if let Some(file_handles) = file_handles {
        file_handles.pop(collection);
    }
    let Some(instance) = instances.remove(record.id()) else {
        return;
    };
    match instance.stop() {
        Ok(()) => {
            stats.record_memory_eviction();
            info!(collection = %collection, segment = %record.id(), "evicted segment for memory");
        }
        Err(e) => {
            stats.record_failed_eviction();
            warn!(
                collection = %collection,
                segment = %record.id(),
                error = %e,
                "failed to stop evicted segment"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CachePolicy;
    use crate::registry::SegmentTypeDescriptor;
    use crate::segment::SegmentInstance;
    use crate::sysdb::InMemorySysDb;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        record: SegmentRecord,
        stops: Arc<AtomicUsize>,
    }

    impl SegmentInstance for Counting {
        fn record(&self) -> &SegmentRecord {
            &self.record
        }

        fn start(&self) -> CoreResult<()> {
            Ok(())
        }

        fn stop(&self) -> CoreResult<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn registry(stops: &Arc<AtomicUsize>) -> SegmentTypeRegistry {
        let mut registry = SegmentTypeRegistry::new();
        for ty in [
            SegmentType::Sqlite,
            SegmentType::HnswLocalMemory,
            SegmentType::HnswLocalPersisted,
        ] {
            let stops = Arc::clone(stops);
            registry.register(
                ty,
                SegmentTypeDescriptor::new(Placement::InProcess, move |record, _| {
                    Ok(Arc::new(Counting {
                        record,
                        stops: Arc::clone(&stops),
                    }) as SegmentHandle)
                }),
            );
        }
        registry
    }

    fn manager(
        config: ManagerConfig,
    ) -> (LocalSegmentManager, Arc<InMemorySysDb>, Arc<AtomicUsize>) {
        let stops = Arc::new(AtomicUsize::new(0));
        let sysdb = Arc::new(InMemorySysDb::new());
        let manager = LocalSegmentManager::new(sysdb.clone(), &registry(&stops), config).unwrap();
        (manager, sysdb, stops)
    }

    #[test]
    fn prepare_follows_persistence() {
        let (memory, _, _) = manager(ManagerConfig::new());
        let records = memory.prepare_segments_for_new_collection(&Collection::new("docs"));
        let types: Vec<_> = records.iter().map(|r| r.segment_type().clone()).collect();
        assert_eq!(types, vec![SegmentType::HnswLocalMemory, SegmentType::Sqlite]);

        let dir = tempfile::tempdir().unwrap();
        let (persistent, _, _) =
            manager(ManagerConfig::new().persist_directory(dir.path()).max_file_handles(64));
        let records = persistent.prepare_segments_for_new_collection(&Collection::new("docs"));
        assert_eq!(records[0].segment_type(), &SegmentType::HnswLocalPersisted);
        assert_eq!(records[1].scope(), SegmentScope::Metadata);
    }

    #[test]
    fn second_lookup_hits_cache() {
        let (manager, sysdb, _) = manager(ManagerConfig::new());
        let collection = Collection::new("docs");
        sysdb.create_segments(manager.prepare_segments_for_new_collection(&collection));

        let first = manager.get_segment(collection.id, Capability::VectorReader).unwrap();
        let second = manager.get_segment(collection.id, Capability::VectorReader).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(sysdb.fetch_count(), 1);
        assert_eq!(manager.stats().record_cache_hits(), 1);
        assert_eq!(manager.stats().instances_started(), 1);
    }

    #[test]
    fn missing_segment_is_not_found() {
        let (manager, _, _) = manager(ManagerConfig::new());
        let result = manager.get_segment(CollectionId::new(), Capability::MetadataReader);
        assert!(matches!(
            result,
            Err(CoreError::SegmentNotFound { scope: SegmentScope::Metadata, .. })
        ));
        assert_eq!(manager.running_instances(), 0);
    }

    #[test]
    fn reset_stops_everything() {
        let (manager, sysdb, stops) = manager(ManagerConfig::new());
        let collection = Collection::new("docs");
        sysdb.create_segments(manager.prepare_segments_for_new_collection(&collection));
        manager
            .hint_use_collection(collection.id, Operation::Add)
            .unwrap();
        assert_eq!(manager.running_instances(), 2);

        manager.reset_state().unwrap();
        assert_eq!(manager.running_instances(), 0);
        assert_eq!(stops.load(Ordering::SeqCst), 2);
        assert!(!manager.is_cached(collection.id, SegmentScope::Vector));
    }

    #[test]
    fn zero_budget_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let stops = Arc::new(AtomicUsize::new(0));
        let config = ManagerConfig::new()
            .persist_directory(dir.path())
            .max_file_handles(3)
            .handles_per_persistent_index(4);
        let result =
            LocalSegmentManager::new(Arc::new(InMemorySysDb::new()), &registry(&stops), config);
        assert!(matches!(result, Err(CoreError::InvalidConfig { .. })));
    }

    #[test]
    fn lru_without_persistence_sizes_zero() {
        let (manager, sysdb, stops) =
            manager(ManagerConfig::new().cache_policy(CachePolicy::Lru).memory_limit_bytes(1));
        let collections: Vec<_> = (0..3).map(|i| Collection::new(format!("c{i}"))).collect();
        for collection in &collections {
            sysdb.create_segments(manager.prepare_segments_for_new_collection(collection));
            manager
                .get_segment(collection.id, Capability::VectorReader)
                .unwrap();
        }
        assert_eq!(stops.load(Ordering::SeqCst), 0);
        assert_eq!(manager.running_instances(), 3);
    }
}
