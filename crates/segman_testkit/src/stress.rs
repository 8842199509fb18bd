//! Concurrent access helpers.
//!
//! These drive one manager from many threads at once to check that a
//! segment is built and started at most once.

use segman_core::{Capability, CollectionId, CoreResult, SegmentHandle, SegmentManager};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

/// Configuration for concurrent lookups.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of threads.
    pub threads: usize,
    /// Lookups per thread.
    pub rounds: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 8,
            rounds: 16,
        }
    }
}

/// Outcome of a concurrent lookup run.
pub struct StressTestResult {
    /// Every lookup result, in no particular order.
    pub results: Vec<CoreResult<SegmentHandle>>,
    /// Wall time of the run.
    pub duration: Duration,
}

impl StressTestResult {
    /// Number of lookups that failed.
    pub fn failures(&self) -> usize {
        self.results.iter().filter(|r| r.is_err()).count()
    }

    /// Returns true if every successful lookup returned the same instance.
    pub fn all_same_instance(&self) -> bool {
        let mut handles = self.results.iter().filter_map(|r| r.as_ref().ok());
        match handles.next() {
            Some(first) => handles.all(|h| Arc::ptr_eq(first, h)),
            None => true,
        }
    }
}

/// Runs `get_segment` for one collection from many threads, all released
/// together by a barrier.
pub fn concurrent_get_segment<M>(
    manager: Arc<M>,
    collection: CollectionId,
    capability: Capability,
    config: &StressConfig,
) -> StressTestResult
where
    M: SegmentManager + 'static,
{
    let barrier = Arc::new(Barrier::new(config.threads));
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            let rounds = config.rounds;
            thread::spawn(move || {
                barrier.wait();
                (0..rounds)
                    .map(|_| manager.get_segment(collection, capability))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut results = Vec::with_capacity(config.threads * config.rounds);
    for handle in handles {
        results.extend(handle.join().expect("Thread panicked"));
    }

    StressTestResult {
        results,
        duration: start.elapsed(),
    }
}

/// Runs warm-up hints for several collections from many threads.
pub fn concurrent_hints<M>(manager: Arc<M>, collections: &[CollectionId], threads: usize) -> usize
where
    M: SegmentManager + 'static,
{
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            let collections = collections.to_vec();
            thread::spawn(move || {
                barrier.wait();
                collections
                    .iter()
                    .cycle()
                    .skip(t)
                    .take(collections.len())
                    .filter(|c| {
                        manager
                            .hint_use_collection(**c, segman_core::Operation::Add)
                            .is_err()
                    })
                    .count()
            })
        })
        .collect();

    handles
        .into_iter()
        .map(|h| h.join().expect("Thread panicked"))
        .sum()
}
