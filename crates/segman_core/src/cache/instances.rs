//! Registry of running segment instances.

use crate::error::CoreResult;
use crate::segment::SegmentHandle;
use crate::types::SegmentId;
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

/// Running instances keyed by segment ID.
///
/// This is the single source of truth for whether a segment is running.
/// Construction happens inside the registry lock, so concurrent callers
/// racing on a cold segment build and start it exactly once. The lock is
/// shared by all segments, which serializes first loads of unrelated
/// segments.
#[derive(Default)]
pub struct InstanceRegistry {
    instances: Mutex<HashMap<SegmentId, SegmentHandle>>,
}

impl InstanceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the running instance for a segment.
    #[must_use]
    pub fn get(&self, id: SegmentId) -> Option<SegmentHandle> {
        self.instances.lock().get(&id).cloned()
    }

    /// Returns the running instance, building it with `create` if absent.
    ///
    /// `create` runs while the registry lock is held and must not call
    /// back into this registry. If it fails nothing is registered.
    /// The flag is true when this call created the instance.
    pub fn get_or_try_insert_with<F>(
        &self,
        id: SegmentId,
        create: F,
    ) -> CoreResult<(SegmentHandle, bool)>
    where
        F: FnOnce() -> CoreResult<SegmentHandle>,
    {
        let mut instances = self.instances.lock();
        match instances.entry(id) {
            Entry::Occupied(entry) => Ok((entry.get().clone(), false)),
            Entry::Vacant(entry) => {
                let instance = create()?;
                Ok((entry.insert(instance).clone(), true))
            }
        }
    }

    /// Removes and returns an instance.
    pub fn remove(&self, id: SegmentId) -> Option<SegmentHandle> {
        self.instances.lock().remove(&id)
    }

    /// Returns true if the segment has a running instance.
    #[must_use]
    pub fn contains(&self, id: SegmentId) -> bool {
        self.instances.lock().contains_key(&id)
    }

    /// Returns the number of running instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.lock().len()
    }

    /// Returns true if nothing is running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.lock().is_empty()
    }

    /// Returns handles to every running instance.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SegmentHandle> {
        self.instances.lock().values().cloned().collect()
    }

    /// Removes every instance and returns them.
    pub fn drain(&self) -> Vec<SegmentHandle> {
        self.instances.lock().drain().map(|(_, instance)| instance).collect()
    }
}

impl fmt::Debug for InstanceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceRegistry")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::segment::{SegmentInstance, SegmentRecord};
    use crate::types::{CollectionId, SegmentScope, SegmentType};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

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

    fn inert() -> SegmentHandle {
        Arc::new(Inert(SegmentRecord::new(
            SegmentType::Sqlite,
            SegmentScope::Metadata,
            CollectionId::new(),
            None,
        )))
    }

    #[test]
    fn creates_once() {
        let registry = InstanceRegistry::new();
        let id = SegmentId::new();

        let (first, created) = registry.get_or_try_insert_with(id, || Ok(inert())).unwrap();
        assert!(created);
        let (second, created) = registry
            .get_or_try_insert_with(id, || panic!("must not rebuild"))
            .unwrap();
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn failed_create_registers_nothing() {
        let registry = InstanceRegistry::new();
        let id = SegmentId::new();

        let result =
            registry.get_or_try_insert_with(id, || Err(CoreError::instance_start(id, "boom")));
        assert!(result.is_err());
        assert!(!registry.contains(id));
    }

    #[test]
    fn concurrent_callers_share_one_instance() {
        let registry = Arc::new(InstanceRegistry::new());
        let id = SegmentId::new();
        let builds = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let builds = Arc::clone(&builds);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    registry
                        .get_or_try_insert_with(id, || {
                            builds.fetch_add(1, Ordering::SeqCst);
                            Ok(inert())
                        })
                        .unwrap()
                        .0
                })
            })
            .collect();

        let instances: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn drain_empties_registry() {
        let registry = InstanceRegistry::new();
        for _ in 0..2 {
            registry
                .get_or_try_insert_with(SegmentId::new(), || Ok(inert()))
                .unwrap();
        }

        assert_eq!(registry.snapshot().len(), 2);
        assert_eq!(registry.drain().len(), 2);
        assert!(registry.is_empty());
    }
}
