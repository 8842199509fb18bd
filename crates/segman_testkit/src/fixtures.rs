//! Segment fakes and manager fixtures.
//!
//! Every segment built through [`test_registry`] is a [`TestSegment`]
//! recorded by a shared [`SegmentProbe`], so tests can inspect lifecycle
//! counters of instances the manager only hands out as trait objects.

use parking_lot::Mutex;
use segman_core::dir::segment_directory;
use segman_core::{
    propagate_hnsw_params, propagate_persistent_hnsw_params, Collection, CollectionId, CoreError,
    CoreResult, DistributedSegmentManager, InMemorySysDb, LocalSegmentManager, ManagerConfig,
    MetadataReader, PersistentIndex, Placement, RendezvousHashDirectory, SegmentContext,
    SegmentHandle, SegmentId, SegmentInstance, SegmentManager, SegmentRecord, SegmentScope,
    SegmentType, SegmentTypeDescriptor, SegmentTypeRegistry, SysDb, VectorReader,
};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// File handles one fake persistent index declares.
pub const TEST_INDEX_FILE_HANDLES: usize = 2;

/// Segment IDs whose lifecycle calls should fail.
#[derive(Debug, Default)]
pub struct FailurePlan {
    start: Mutex<HashSet<SegmentId>>,
    stop: Mutex<HashSet<SegmentId>>,
    delete: Mutex<HashSet<SegmentId>>,
    every_start: AtomicBool,
}

impl FailurePlan {
    fn fails_start(&self, id: SegmentId) -> bool {
        self.every_start.load(Ordering::SeqCst) || self.start.lock().contains(&id)
    }

    fn fails_stop(&self, id: SegmentId) -> bool {
        self.stop.lock().contains(&id)
    }

    fn fails_delete(&self, id: SegmentId) -> bool {
        self.delete.lock().contains(&id)
    }
}

/// In-process fake implementing every segment trait.
#[derive(Debug)]
pub struct TestSegment {
    record: SegmentRecord,
    persist_directory: Option<PathBuf>,
    persistent: bool,
    failures: Arc<FailurePlan>,
    running: AtomicBool,
    index_open: AtomicBool,
    starts: AtomicUsize,
    stops: AtomicUsize,
    deletes: AtomicUsize,
    opens: AtomicUsize,
    closes: AtomicUsize,
}

impl TestSegment {
    fn new(
        record: SegmentRecord,
        context: &SegmentContext,
        persistent: bool,
        failures: Arc<FailurePlan>,
    ) -> Self {
        Self {
            record,
            persist_directory: context.persist_directory.clone(),
            persistent,
            failures,
            running: AtomicBool::new(false),
            index_open: AtomicBool::new(false),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            opens: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }

    /// Returns true between a successful start and the next stop.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of successful `start` calls.
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Number of successful `stop` calls.
    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Number of successful `delete` calls.
    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Number of times the persistent index was opened.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of times the persistent index was closed.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn release_index(&self) {
        self.index_open.store(false, Ordering::SeqCst);
    }
}

impl SegmentInstance for TestSegment {
    fn record(&self) -> &SegmentRecord {
        &self.record
    }

    fn start(&self) -> CoreResult<()> {
        if self.failures.fails_start(self.record.id()) {
            return Err(CoreError::instance_start(self.record.id(), "injected start failure"));
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> CoreResult<()> {
        if self.failures.fails_stop(self.record.id()) {
            return Err(CoreError::instance_stop(self.record.id(), "injected stop failure"));
        }
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.release_index();
        Ok(())
    }

    fn delete(&self) -> CoreResult<()> {
        if self.failures.fails_delete(self.record.id()) {
            return Err(CoreError::instance_delete(self.record.id(), "injected delete failure"));
        }
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.release_index();

        if let Some(root) = &self.persist_directory {
            let path = segment_directory(root, self.record.id());
            if path.exists() {
                fs::remove_dir_all(&path)?;
            }
        }
        Ok(())
    }

    fn as_persistent_index(&self) -> Option<&dyn PersistentIndex> {
        if self.persistent {
            Some(self)
        } else {
            None
        }
    }

    fn as_metadata_reader(&self) -> Option<&dyn MetadataReader> {
        (self.record.scope() == SegmentScope::Metadata).then_some(self as &dyn MetadataReader)
    }

    fn as_vector_reader(&self) -> Option<&dyn VectorReader> {
        (self.record.scope() == SegmentScope::Vector).then_some(self as &dyn VectorReader)
    }
}

impl PersistentIndex for TestSegment {
    fn file_handle_count(&self) -> usize {
        if self.is_open() {
            TEST_INDEX_FILE_HANDLES
        } else {
            0
        }
    }

    fn open_persistent_index(&self) -> CoreResult<()> {
        if !self.index_open.swap(true, Ordering::SeqCst) {
            self.opens.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn close_persistent_index(&self) -> CoreResult<()> {
        if self.index_open.swap(false, Ordering::SeqCst) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.index_open.load(Ordering::SeqCst)
    }
}

impl MetadataReader for TestSegment {
    fn count(&self) -> CoreResult<u64> {
        Ok(0)
    }
}

impl VectorReader for TestSegment {
    /// Reads reopen a closed persistent index.
    fn count(&self) -> CoreResult<u64> {
        if self.persistent {
            self.open_persistent_index()?;
        }
        Ok(0)
    }

    fn dimensionality(&self) -> CoreResult<Option<usize>> {
        Ok(None)
    }
}

/// Records every segment built by the test registry.
#[derive(Debug, Default)]
pub struct SegmentProbe {
    segments: Mutex<Vec<Arc<TestSegment>>>,
    failures: Arc<FailurePlan>,
}

impl SegmentProbe {
    /// Creates an empty probe.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn build(
        &self,
        record: SegmentRecord,
        context: &SegmentContext,
        persistent: bool,
    ) -> Arc<TestSegment> {
        tracing::trace!(
            segment = %record.id(),
            segment_type = %record.segment_type(),
            "building test segment"
        );
        let segment = Arc::new(TestSegment::new(
            record,
            context,
            persistent,
            Arc::clone(&self.failures),
        ));
        self.segments.lock().push(Arc::clone(&segment));
        segment
    }

    /// Total number of segments built.
    pub fn constructions(&self) -> usize {
        self.segments.lock().len()
    }

    /// Number of times a given segment was built.
    pub fn constructions_of(&self, id: SegmentId) -> usize {
        self.segments
            .lock()
            .iter()
            .filter(|s| s.record().id() == id)
            .count()
    }

    /// Returns the most recently built segment with the given ID.
    pub fn segment(&self, id: SegmentId) -> Option<Arc<TestSegment>> {
        self.segments
            .lock()
            .iter()
            .rev()
            .find(|s| s.record().id() == id)
            .cloned()
    }

    /// Returns every segment built for a collection.
    pub fn segments_of(&self, collection: CollectionId) -> Vec<Arc<TestSegment>> {
        self.segments
            .lock()
            .iter()
            .filter(|s| s.record().collection() == collection)
            .cloned()
            .collect()
    }

    /// Makes `start` fail for a segment.
    pub fn fail_start(&self, id: SegmentId) {
        self.failures.start.lock().insert(id);
    }

    /// Makes `start` fail for every segment.
    pub fn fail_every_start(&self, fail: bool) {
        self.failures.every_start.store(fail, Ordering::SeqCst);
    }

    /// Makes `stop` fail for a segment.
    pub fn fail_stop(&self, id: SegmentId) {
        self.failures.stop.lock().insert(id);
    }

    /// Makes `delete` fail for a segment.
    pub fn fail_delete(&self, id: SegmentId) {
        self.failures.delete.lock().insert(id);
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        self.failures.start.lock().clear();
        self.failures.stop.lock().clear();
        self.failures.delete.lock().clear();
        self.fail_every_start(false);
    }
}

/// Registers every built-in segment type, backed by [`TestSegment`].
pub fn test_registry(probe: &Arc<SegmentProbe>) -> SegmentTypeRegistry {
    let fake = |placement: Placement, persistent: bool| {
        let probe = Arc::clone(probe);
        SegmentTypeDescriptor::new(placement, move |record, context| {
            Ok(probe.build(record, context, persistent) as SegmentHandle)
        })
    };

    SegmentTypeRegistry::new()
        .with(SegmentType::Sqlite, fake(Placement::InProcess, false))
        .with(
            SegmentType::HnswLocalMemory,
            fake(Placement::InProcess, false).with_propagation(propagate_hnsw_params),
        )
        .with(
            SegmentType::HnswLocalPersisted,
            fake(Placement::InProcess, true)
                .with_propagation(propagate_persistent_hnsw_params)
                .with_file_handles(TEST_INDEX_FILE_HANDLES),
        )
        .with(
            SegmentType::HnswDistributed,
            fake(Placement::RemoteProxy, false).with_propagation(propagate_hnsw_params),
        )
        .with(SegmentType::BlockfileMetadata, fake(Placement::RemoteProxy, false))
        .with(SegmentType::BlockfileRecord, fake(Placement::RemoteProxy, false))
}

/// A temporary persist directory with automatic cleanup.
#[derive(Debug)]
pub struct PersistDir {
    dir: TempDir,
}

impl PersistDir {
    /// Creates an empty persist directory.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Returns the root path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Writes `bytes` bytes of index data for a segment.
    pub fn write_segment(&self, segment: SegmentId, bytes: usize) -> PathBuf {
        let path = segment_directory(self.path(), segment);
        fs::create_dir_all(&path).expect("Failed to create segment directory");
        let mut file =
            fs::File::create(path.join("data_level0.bin")).expect("Failed to create index file");
        file.write_all(&vec![0u8; bytes])
            .expect("Failed to write index file");
        path
    }
}

impl Default for PersistDir {
    fn default() -> Self {
        Self::new()
    }
}

/// A local manager over an in-memory system of record.
pub struct LocalFixture {
    /// The manager under test.
    pub manager: Arc<LocalSegmentManager>,
    /// The system of record.
    pub sysdb: Arc<InMemorySysDb>,
    /// Observes every segment the manager builds.
    pub probe: Arc<SegmentProbe>,
    /// The persist directory, for persistent fixtures.
    pub persist: Option<PersistDir>,
}

impl LocalFixture {
    /// Creates an in-memory fixture with default configuration.
    pub fn in_memory() -> Self {
        Self::with_config(ManagerConfig::new(), None)
    }

    /// Creates a persistent fixture; `configure` adjusts the configuration.
    pub fn persistent(configure: impl FnOnce(ManagerConfig) -> ManagerConfig) -> Self {
        let persist = PersistDir::new();
        let config = configure(ManagerConfig::new().persist_directory(persist.path()));
        Self::with_config(config, Some(persist))
    }

    /// Creates a fixture with an explicit configuration.
    pub fn with_config(config: ManagerConfig, persist: Option<PersistDir>) -> Self {
        let probe = SegmentProbe::new();
        let sysdb = Arc::new(InMemorySysDb::new());
        let manager = LocalSegmentManager::new(sysdb.clone(), &test_registry(&probe), config)
            .expect("Failed to create local manager");
        let manager = Arc::new(manager);
        Self {
            manager,
            sysdb,
            probe,
            persist,
        }
    }

    /// Prepares and persists the segments of a new collection.
    pub fn create_collection(&self, name: &str) -> Collection {
        self.add_collection(Collection::new(name))
    }

    /// Prepares and persists the segments of `collection`.
    pub fn add_collection(&self, collection: Collection) -> Collection {
        let records = self.manager.prepare_segments_for_new_collection(&collection);
        self.sysdb.create_segments(records);
        collection
    }

    /// Returns the persisted segment ID of a collection for a scope.
    pub fn segment_id(&self, collection: CollectionId, scope: SegmentScope) -> SegmentId {
        segment_id(self.sysdb.as_ref(), collection, scope)
    }

    /// Writes vector index data of the given size for a collection.
    pub fn write_vector_segment(&self, collection: CollectionId, bytes: usize) -> PathBuf {
        let persist = self
            .persist
            .as_ref()
            .expect("Fixture has no persist directory");
        persist.write_segment(self.segment_id(collection, SegmentScope::Vector), bytes)
    }

    /// Returns the fake behind a collection's segment for a scope.
    pub fn segment(&self, collection: CollectionId, scope: SegmentScope) -> Arc<TestSegment> {
        self.probe
            .segment(self.segment_id(collection, scope))
            .expect("Segment was never built")
    }
}

/// A distributed manager over an in-memory system of record.
pub struct DistributedFixture {
    /// The manager under test.
    pub manager: Arc<DistributedSegmentManager>,
    /// The system of record.
    pub sysdb: Arc<InMemorySysDb>,
    /// Observes every segment the manager builds.
    pub probe: Arc<SegmentProbe>,
    /// The endpoint directory.
    pub directory: Arc<RendezvousHashDirectory>,
}

impl DistributedFixture {
    /// Creates a fixture whose directory knows the given workers.
    pub fn new(members: &[&str]) -> Self {
        let probe = SegmentProbe::new();
        let sysdb = Arc::new(InMemorySysDb::new());
        let directory = Arc::new(RendezvousHashDirectory::new(members.iter().copied()));
        let manager = Arc::new(DistributedSegmentManager::new(
            sysdb.clone(),
            directory.clone(),
            &test_registry(&probe),
        ));
        Self {
            manager,
            sysdb,
            probe,
            directory,
        }
    }

    /// Prepares and persists the segments of a new collection.
    pub fn create_collection(&self, name: &str) -> Collection {
        let collection = Collection::new(name);
        let records = self.manager.prepare_segments_for_new_collection(&collection);
        self.sysdb.create_segments(records);
        collection
    }

    /// Returns the persisted segment ID of a collection for a scope.
    pub fn segment_id(&self, collection: CollectionId, scope: SegmentScope) -> SegmentId {
        segment_id(self.sysdb.as_ref(), collection, scope)
    }
}

fn segment_id(sysdb: &dyn SysDb, collection: CollectionId, scope: SegmentScope) -> SegmentId {
    sysdb
        .get_segments(collection, Some(scope))
        .expect("Failed to read segments")
        .first()
        .map(SegmentRecord::id)
        .expect("Collection has no segment in scope")
}

/// Installs a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to `warn`.
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
