//! Segment manager statistics.
//!
//! # Usage
//!
//! ```rust,ignore
//! let manager = LocalSegmentManager::new(sysdb, registry, config)?;
//! manager.get_segment(collection, Capability::VectorReader)?;
//!
//! let stats = manager.stats().snapshot();
//! println!("instances started: {}", stats.instances_started);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing cache and lifecycle activity.
///
/// All counters are atomic, monotonically increasing, and can be read
/// while operations are in progress.
#[derive(Debug, Default)]
pub struct ManagerStats {
    record_cache_hits: AtomicU64,
    record_cache_misses: AtomicU64,
    sysdb_fetches: AtomicU64,
    instances_started: AtomicU64,
    memory_evictions: AtomicU64,
    file_handle_evictions: AtomicU64,
    failed_evictions: AtomicU64,
    segments_deleted: AtomicU64,
}

impl ManagerStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_cache_hit(&self) {
        self.record_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_miss(&self) {
        self.record_cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sysdb_fetch(&self) {
        self.sysdb_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_instance_started(&self) {
        self.instances_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_memory_eviction(&self) {
        self.memory_evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_file_handle_evictions(&self, count: u64) {
        self.file_handle_evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_failed_eviction(&self) {
        self.failed_evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_segment_deleted(&self) {
        self.segments_deleted.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of record lookups served from cache.
    pub fn record_cache_hits(&self) -> u64 {
        self.record_cache_hits.load(Ordering::Relaxed)
    }

    /// Returns the number of record lookups that missed the cache.
    pub fn record_cache_misses(&self) -> u64 {
        self.record_cache_misses.load(Ordering::Relaxed)
    }

    /// Returns the number of reads issued to the system of record.
    pub fn sysdb_fetches(&self) -> u64 {
        self.sysdb_fetches.load(Ordering::Relaxed)
    }

    /// Returns the number of instances built and started.
    pub fn instances_started(&self) -> u64 {
        self.instances_started.load(Ordering::Relaxed)
    }

    /// Returns the number of instances stopped by memory pressure.
    pub fn memory_evictions(&self) -> u64 {
        self.memory_evictions.load(Ordering::Relaxed)
    }

    /// Returns the number of persistent indexes closed by handle pressure.
    pub fn file_handle_evictions(&self) -> u64 {
        self.file_handle_evictions.load(Ordering::Relaxed)
    }

    /// Returns the number of evictions whose teardown failed.
    pub fn failed_evictions(&self) -> u64 {
        self.failed_evictions.load(Ordering::Relaxed)
    }

    /// Returns the number of running segments torn down by deletion.
    pub fn segments_deleted(&self) -> u64 {
        self.segments_deleted.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            record_cache_hits: self.record_cache_hits(),
            record_cache_misses: self.record_cache_misses(),
            sysdb_fetches: self.sysdb_fetches(),
            instances_started: self.instances_started(),
            memory_evictions: self.memory_evictions(),
            file_handle_evictions: self.file_handle_evictions(),
            failed_evictions: self.failed_evictions(),
            segments_deleted: self.segments_deleted(),
        }
    }
}

/// A point-in-time snapshot of manager statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Record lookups served from cache.
    pub record_cache_hits: u64,
    /// Record lookups that missed the cache.
    pub record_cache_misses: u64,
    /// Reads issued to the system of record.
    pub sysdb_fetches: u64,
    /// Instances built and started.
    pub instances_started: u64,
    /// Instances stopped by memory pressure.
    pub memory_evictions: u64,
    /// Persistent indexes closed by handle pressure.
    pub file_handle_evictions: u64,
    /// Evictions whose teardown failed.
    pub failed_evictions: u64,
    /// Running segments torn down by deletion.
    pub segments_deleted: u64,
}

impl StatsSnapshot {
    /// Returns the fraction of record lookups served from cache.
    #[must_use]
    pub fn record_cache_hit_rate(&self) -> f64 {
        let total = self.record_cache_hits + self.record_cache_misses;
        if total == 0 {
            0.0
        } else {
            self.record_cache_hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = ManagerStats::new();
        stats.record_cache_hit();
        stats.record_cache_hit();
        stats.record_cache_miss();
        stats.record_file_handle_evictions(3);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.record_cache_hits, 2);
        assert_eq!(snapshot.record_cache_misses, 1);
        assert_eq!(snapshot.file_handle_evictions, 3);
        assert!((snapshot.record_cache_hit_rate() - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_hit_rate() {
        assert_eq!(StatsSnapshot::default().record_cache_hit_rate(), 0.0);
    }
}
