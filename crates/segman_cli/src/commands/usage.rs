//! Usage command implementation.

use super::format_size;
use segman_core::cache::SizedLru;
use segman_core::dir::directory_size;
use segman_core::SegmentId;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::SystemTime;

/// On-disk footprint of one segment directory.
#[derive(Debug, Serialize)]
pub struct SegmentUsage {
    /// Segment ID, taken from the directory name.
    pub segment: String,
    /// Total size of the directory in bytes.
    pub size_bytes: u64,
    /// True if a manager with the given memory limit would evict it.
    pub evicted: bool,
}

/// Usage report for a persist directory.
#[derive(Debug, Serialize)]
pub struct UsageResult {
    /// Persist directory path.
    pub path: String,
    /// Summed size of all segment directories.
    pub total_size: u64,
    /// Memory limit used for the eviction simulation. A zero limit means
    /// unbounded, as in the manager, and is reported as absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<u64>,
    /// Segments, oldest first.
    pub segments: Vec<SegmentUsage>,
}

/// Scans a persist directory and simulates loading every segment, oldest
/// first, into a cache bounded by `memory_limit`.
pub fn collect(
    path: &Path,
    memory_limit: Option<u64>,
) -> Result<UsageResult, Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("No persist directory found at {:?}", path).into());
    }

    let mut found: Vec<(SystemTime, SegmentId, u64)> = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(segment) = name.to_str().and_then(|n| n.parse::<SegmentId>().ok()) else {
            tracing::debug!(entry = ?name, "skipping non-segment entry");
            continue;
        };
        let modified = entry.metadata()?.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        found.push((modified, segment, directory_size(&entry.path())?));
    }
    found.sort();

    let memory_limit = memory_limit.filter(|limit| *limit > 0);
    let evicted: HashSet<SegmentId> = match memory_limit {
        Some(limit) => {
            let mut lru = SizedLru::new(limit);
            found
                .iter()
                .flat_map(|(_, segment, size)| lru.insert(*segment, (), *size))
                .map(|(segment, ())| segment)
                .collect()
        }
        None => HashSet::new(),
    };

    let segments = found
        .iter()
        .map(|(_, segment, size)| SegmentUsage {
            segment: segment.to_string(),
            size_bytes: *size,
            evicted: evicted.contains(segment),
        })
        .collect();

    Ok(UsageResult {
        path: path.display().to_string(),
        total_size: found.iter().map(|(_, _, size)| size).sum(),
        memory_limit,
        segments,
    })
}

/// Runs the usage command.
pub fn run(
    path: &Path,
    memory_limit: Option<u64>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = collect(path, memory_limit)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &UsageResult) {
    println!("Segment Usage");
    println!("=============");
    println!();
    println!("Path:       {}", result.path);
    println!("Total size: {} bytes", format_size(result.total_size));
    if let Some(limit) = result.memory_limit {
        println!("Budget:     {} bytes", format_size(limit));
    }
    println!();

    for segment in &result.segments {
        let marker = if segment.evicted { "  (evicted)" } else { "" };
        println!(
            "  {}  {:>10}{}",
            segment.segment,
            format_size(segment.size_bytes),
            marker
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use segman_core::dir::segment_directory;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_segment(root: &Path, bytes: usize) -> SegmentId {
        let segment = SegmentId::new();
        let dir = segment_directory(root, segment);
        fs::create_dir_all(&dir).unwrap();
        fs::File::create(dir.join("data_level0.bin"))
            .unwrap()
            .write_all(&vec![1u8; bytes])
            .unwrap();
        segment
    }

    #[test]
    fn sums_segment_directories() {
        let root = TempDir::new().unwrap();
        write_segment(root.path(), 300);
        write_segment(root.path(), 200);
        fs::create_dir(root.path().join("not-a-segment")).unwrap();

        let result = collect(root.path(), None).unwrap();
        assert_eq!(result.segments.len(), 2);
        assert_eq!(result.total_size, 500);
        assert!(result.segments.iter().all(|s| !s.evicted));
    }

    #[test]
    fn simulation_keeps_total_within_limit() {
        let root = TempDir::new().unwrap();
        for _ in 0..3 {
            write_segment(root.path(), 600);
        }

        let result = collect(root.path(), Some(1000)).unwrap();
        let kept: Vec<_> = result.segments.iter().filter(|s| !s.evicted).collect();
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn zero_limit_is_unbounded() {
        let root = TempDir::new().unwrap();
        for _ in 0..3 {
            write_segment(root.path(), 10);
        }

        let result = collect(root.path(), Some(0)).unwrap();
        assert_eq!(result.memory_limit, None);
        assert!(result.segments.iter().all(|s| !s.evicted));
    }

    #[test]
    fn missing_directory_fails() {
        let root = TempDir::new().unwrap();
        assert!(collect(&root.path().join("absent"), None).is_err());
    }
}
