//! Segment manager for deployments whose segments live on remote workers.

use super::{
    capability_scope, for_each_instance, load_segment, new_segment, resolve_record, SegmentManager,
};
use crate::cache::{BasicRecordCache, InstanceRegistry, SegmentRecordCache};
use crate::error::CoreResult;
use crate::registry::{Placement, SegmentContext, SegmentTypeRegistry};
use crate::routing::SegmentDirectory;
use crate::segment::{SegmentHandle, SegmentRecord, GRPC_URL_KEY};
use crate::stats::ManagerStats;
use crate::sysdb::SysDb;
use crate::types::{
    Capability, Collection, CollectionId, MetadataValue, Operation, SegmentId, SegmentScope,
    SegmentType,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Segment manager whose instances are proxies to remote workers.
///
/// Records are cached without bound and no local resource budget applies.
/// Each freshly fetched record is annotated with the endpoint of the worker
/// serving it before its proxy is built.
pub struct DistributedSegmentManager {
    sysdb: Arc<dyn SysDb>,
    directory: Arc<dyn SegmentDirectory>,
    registry: SegmentTypeRegistry,
    context: SegmentContext,
    instances: InstanceRegistry,
    metadata_records: BasicRecordCache,
    vector_records: BasicRecordCache,
    stats: ManagerStats,
}

impl DistributedSegmentManager {
    /// Creates a manager over `sysdb`, resolving endpoints with `directory`.
    ///
    /// Remote proxy types of `registry` are used, plus in-process metadata
    /// types.
    pub fn new(
        sysdb: Arc<dyn SysDb>,
        directory: Arc<dyn SegmentDirectory>,
        registry: &SegmentTypeRegistry,
    ) -> Self {
        let registry = registry.restricted(|ty, desc| match desc.placement() {
            Placement::RemoteProxy => true,
            Placement::InProcess => ty.scope() == Some(SegmentScope::Metadata),
        });
        Self {
            sysdb,
            directory,
            registry,
            context: SegmentContext::default(),
            instances: InstanceRegistry::new(),
            metadata_records: BasicRecordCache::new(),
            vector_records: BasicRecordCache::new(),
            stats: ManagerStats::new(),
        }
    }

    /// Returns the segment types this manager can serve.
    #[must_use]
    pub fn registry(&self) -> &SegmentTypeRegistry {
        &self.registry
    }

    /// Returns true if the segment has a running proxy.
    #[must_use]
    pub fn is_running(&self, segment: SegmentId) -> bool {
        self.instances.contains(segment)
    }

    /// Returns the number of running proxies.
    #[must_use]
    pub fn running_instances(&self) -> usize {
        self.instances.len()
    }

    fn records(&self, scope: SegmentScope) -> &dyn SegmentRecordCache {
        match scope {
            SegmentScope::Vector => &self.vector_records,
            _ => &self.metadata_records,
        }
    }

    fn with_endpoint(&self, record: SegmentRecord) -> CoreResult<SegmentRecord> {
        let endpoint = self.directory.get_segment_endpoint(&record)?;
        debug!(segment = %record.id(), endpoint = %endpoint, "resolved segment endpoint");
        Ok(record.with_metadata_entry(GRPC_URL_KEY, MetadataValue::Str(endpoint)))
    }
}

impl SegmentManager for DistributedSegmentManager {
    fn prepare_segments_for_new_collection(&self, collection: &Collection) -> Vec<SegmentRecord> {
        vec![
            new_segment(
                &self.registry,
                SegmentType::HnswDistributed,
                SegmentScope::Vector,
                collection,
            ),
            new_segment(
                &self.registry,
                SegmentType::BlockfileMetadata,
                SegmentScope::Metadata,
                collection,
            ),
            new_segment(
                &self.registry,
                SegmentType::BlockfileRecord,
                SegmentScope::Record,
                collection,
            ),
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
            |record| self.with_endpoint(record),
        )?;
        load_segment(cache, &self.instances, &self.registry, &self.context, &self.stats, resolved)
    }

    fn delete_segments(&self, collection: CollectionId) -> CoreResult<Vec<SegmentId>> {
        self.stats.record_sysdb_fetch();
        let rows = self.sysdb.get_segments(collection, None)?;
        let ids: Vec<SegmentId> = rows.iter().map(SegmentRecord::id).collect();

        for id in &ids {
            if let Some(instance) = self.instances.remove(*id) {
                if let Err(e) = instance.stop() {
                    warn!(
                        collection = %collection,
                        segment = %id,
                        error = %e,
                        "failed to stop segment proxy"
                    );
                }
                self.stats.record_segment_deleted();
            }
        }
        self.vector_records.pop(collection);
        self.metadata_records.pop(collection);

        info!(collection = %collection, segments = ids.len(), "forgot collection segments");
        Ok(ids)
    }

    fn hint_use_collection(
        &self,
        _collection: CollectionId,
        _operation: Operation,
    ) -> CoreResult<()> {
        Ok(())
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
        for_each_instance(drained, |instance| instance.stop())
    }

    fn stats(&self) -> &ManagerStats {
        &self.stats
    }
}

impl fmt::Debug for DistributedSegmentManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributedSegmentManager")
            .field("registry", &self.registry)
            .field("instances", &self.instances)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::registry::{propagate_hnsw_params, SegmentTypeDescriptor};
    use crate::routing::RendezvousHashDirectory;
    use crate::segment::SegmentInstance;
    use crate::sysdb::InMemorySysDb;
    use crate::types::Metadata;

    struct Proxy(SegmentRecord);

    impl SegmentInstance for Proxy {
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

    fn proxy(placement: Placement) -> SegmentTypeDescriptor {
        SegmentTypeDescriptor::new(placement, |record, _| {
            Ok(Arc::new(Proxy(record)) as SegmentHandle)
        })
    }

    fn manager() -> (DistributedSegmentManager, Arc<InMemorySysDb>) {
        let registry = SegmentTypeRegistry::new()
            .with(
                SegmentType::HnswDistributed,
                proxy(Placement::RemoteProxy).with_propagation(propagate_hnsw_params),
            )
            .with(SegmentType::BlockfileMetadata, proxy(Placement::RemoteProxy))
            .with(SegmentType::BlockfileRecord, proxy(Placement::RemoteProxy))
            .with(SegmentType::Sqlite, proxy(Placement::InProcess))
            .with(SegmentType::HnswLocalMemory, proxy(Placement::InProcess));
        let sysdb = Arc::new(InMemorySysDb::new());
        let directory = Arc::new(RendezvousHashDirectory::new(["worker-0"]));
        let manager = DistributedSegmentManager::new(sysdb.clone(), directory, &registry);
        (manager, sysdb)
    }

    #[test]
    fn known_types_exclude_local_vector() {
        let (manager, _) = manager();
        assert!(manager.registry().is_known(&SegmentType::HnswDistributed));
        assert!(manager.registry().is_known(&SegmentType::Sqlite));
        assert!(!manager.registry().is_known(&SegmentType::HnswLocalMemory));
    }

    #[test]
    fn prepare_covers_three_scopes() {
        let (manager, _) = manager();
        let mut metadata = Metadata::new();
        metadata.insert("hnsw:space".into(), "cosine".into());
        let collection = Collection::new("docs").with_metadata(metadata);

        let records = manager.prepare_segments_for_new_collection(&collection);
        let scopes: Vec<_> = records.iter().map(SegmentRecord::scope).collect();
        assert_eq!(
            scopes,
            vec![SegmentScope::Vector, SegmentScope::Metadata, SegmentScope::Record]
        );
        assert!(records[0].metadata_value("hnsw:space").is_some());
        assert!(records[1].metadata().is_none());
    }

    #[test]
    fn fetched_record_carries_endpoint() {
        let (manager, sysdb) = manager();
        let collection = Collection::new("docs");
        sysdb.create_segments(manager.prepare_segments_for_new_collection(&collection));

        let segment = manager
            .get_segment(collection.id, Capability::VectorReader)
            .unwrap();
        assert_eq!(
            segment.record().metadata_value(GRPC_URL_KEY),
            Some(&MetadataValue::Str("worker-0:50051".into()))
        );
    }

    #[test]
    fn delete_forgets_proxies() {
        let (manager, sysdb) = manager();
        let collection = Collection::new("docs");
        sysdb.create_segments(manager.prepare_segments_for_new_collection(&collection));
        manager
            .get_segment(collection.id, Capability::MetadataReader)
            .unwrap();

        let deleted = manager.delete_segments(collection.id).unwrap();
        assert_eq!(deleted.len(), 3);
        assert_eq!(manager.running_instances(), 0);
    }

    #[test]
    fn unresolvable_endpoint_registers_nothing() {
        let sysdb = Arc::new(InMemorySysDb::new());
        let registry = SegmentTypeRegistry::new()
            .with(SegmentType::HnswDistributed, proxy(Placement::RemoteProxy));
        let directory = Arc::new(RendezvousHashDirectory::new(Vec::<String>::new()));
        let manager = DistributedSegmentManager::new(sysdb.clone(), directory, &registry);

        let collection = Collection::new("docs");
        sysdb.create_segments(manager.prepare_segments_for_new_collection(&collection));
        let result = manager.get_segment(collection.id, Capability::VectorReader);
        assert!(matches!(result, Err(CoreError::EndpointResolution { .. })));
        assert_eq!(manager.running_instances(), 0);
    }
}
