//! Persist directory layout and OS resource limits.
//!
//! Persistent segments keep their files under one directory per segment:
//!
//! ```text
//! <persist_directory>/
//! ├─ <segment-id>/     # one persistent vector index
//! │  ├─ header.bin
//! │  ├─ data_level0.bin
//! │  └─ ...
//! └─ <segment-id>/
//! ```
//!
//! The size of a segment directory is what a persistent vector segment
//! counts against the memory budget.

use crate::types::SegmentId;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Descriptor limit assumed when the OS limit cannot be read.
pub const DEFAULT_FILE_HANDLE_LIMIT: u64 = 1024;

/// Returns the directory holding a segment's files.
#[must_use]
pub fn segment_directory(persist_directory: &Path, segment: SegmentId) -> PathBuf {
    persist_directory.join(segment.to_string())
}

/// Returns the summed size of all files under `path`.
///
/// A missing path has size 0. Symbolic links are not followed.
pub fn directory_size(path: &Path) -> io::Result<u64> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    if !metadata.is_dir() {
        return Ok(metadata.len());
    }

    let mut total = 0u64;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            total += directory_size(&entry.path())?;
        } else if file_type.is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

/// Returns the soft limit on open file descriptors for this process.
#[cfg(unix)]
#[allow(unsafe_code)]
#[allow(clippy::unnecessary_cast)]
#[must_use]
pub fn os_file_handle_limit() -> u64 {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: getrlimit writes only into the struct passed by pointer.
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) };
    if rc != 0 {
        return DEFAULT_FILE_HANDLE_LIMIT;
    }
    limit.rlim_cur as u64
}

/// Returns the soft limit on open file descriptors for this process.
#[cfg(not(unix))]
#[must_use]
pub fn os_file_handle_limit() -> u64 {
    DEFAULT_FILE_HANDLE_LIMIT
}
