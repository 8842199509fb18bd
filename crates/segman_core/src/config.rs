//! Segment manager configuration.

use crate::dir;
use crate::error::{CoreError, CoreResult};
use std::path::{Path, PathBuf};

/// Policy for the vector-scope record cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Unbounded; segments stay loaded until deleted or reset.
    #[default]
    Basic,
    /// Bounded by the on-disk size of cached vector segments.
    Lru,
}

/// Configuration for a segment manager.
#[derive(Debug, Clone, Default)]
pub struct ManagerConfig {
    /// Directory for persistent segments. `None` runs fully in memory.
    pub persist_directory: Option<PathBuf>,

    /// Policy for the vector-scope record cache.
    pub cache_policy: CachePolicy,

    /// Byte budget for cached vector segments (0 = unbounded).
    pub memory_limit_bytes: u64,

    /// Descriptor limit to budget against instead of the OS limit.
    pub max_file_handles: Option<u64>,

    /// File handles one persistent index holds, overriding the value
    /// declared by the registered persistent vector type.
    pub handles_per_persistent_index: Option<usize>,
}

impl ManagerConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the persist directory, making the deployment persistent.
    #[must_use]
    pub fn persist_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.persist_directory = Some(path.into());
        self
    }

    /// Sets the vector record cache policy.
    #[must_use]
    pub const fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    /// Sets the byte budget for cached vector segments.
    #[must_use]
    pub const fn memory_limit_bytes(mut self, bytes: u64) -> Self {
        self.memory_limit_bytes = bytes;
        self
    }

    /// Overrides the OS descriptor limit.
    #[must_use]
    pub const fn max_file_handles(mut self, limit: u64) -> Self {
        self.max_file_handles = Some(limit);
        self
    }

    /// Overrides the per-index file handle cost.
    #[must_use]
    pub const fn handles_per_persistent_index(mut self, count: usize) -> Self {
        self.handles_per_persistent_index = Some(count);
        self
    }

    /// Returns true if vector indexes are persisted to disk.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.persist_directory.is_some()
    }

    /// Returns the persist directory, if any.
    #[must_use]
    pub fn persist_path(&self) -> Option<&Path> {
        self.persist_directory.as_deref()
    }

    /// Returns true if the vector record cache is bounded by memory.
    #[must_use]
    pub fn uses_memory_budget(&self) -> bool {
        self.cache_policy == CachePolicy::Lru && self.memory_limit_bytes > 0
    }

    /// Returns the descriptor limit to budget against.
    #[must_use]
    pub fn file_handle_limit(&self) -> u64 {
        self.max_file_handles.unwrap_or_else(dir::os_file_handle_limit)
    }

    /// Checks the configuration for values no manager can run with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_file_handles == Some(0) {
            return Err(CoreError::invalid_config("max_file_handles must be positive"));
        }
        if self.handles_per_persistent_index == Some(0) {
            return Err(CoreError::invalid_config(
                "handles_per_persistent_index must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ManagerConfig::default();
        assert!(!config.is_persistent());
        assert_eq!(config.cache_policy, CachePolicy::Basic);
        assert!(!config.uses_memory_budget());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_pattern() {
        let config = ManagerConfig::new()
            .persist_directory("/var/lib/segments")
            .cache_policy(CachePolicy::Lru)
            .memory_limit_bytes(1000)
            .max_file_handles(10)
            .handles_per_persistent_index(2);

        assert!(config.is_persistent());
        assert!(config.uses_memory_budget());
        assert_eq!(config.file_handle_limit(), 10);
        assert_eq!(config.handles_per_persistent_index, Some(2));
    }

    #[test]
    fn lru_without_budget_is_unbounded() {
        let config = ManagerConfig::new().cache_policy(CachePolicy::Lru);
        assert!(!config.uses_memory_budget());
    }

    #[test]
    fn rejects_zero_limits() {
        assert!(ManagerConfig::new().max_file_handles(0).validate().is_err());
        assert!(ManagerConfig::new()
            .handles_per_persistent_index(0)
            .validate()
            .is_err());
    }
}
