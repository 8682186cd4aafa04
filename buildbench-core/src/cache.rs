//! Build Cache Accounting
//!
//! Sizes a build tool's on-disk cache directory. Snapshots are taken once
//! before and once after an iteration batch; their difference is the cache
//! growth attributed to the batch.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Total size and file count of a cache directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    /// Sum of regular file sizes
    pub size_bytes: u64,
    /// Number of regular files
    pub file_count: u64,
}

/// Difference between two snapshots (may be negative if the tool evicts)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheGrowth {
    /// Change in total bytes
    pub size_bytes: i64,
    /// Change in file count
    pub file_count: i64,
}

impl CacheSnapshot {
    /// Growth from `before` to `self`
    pub fn growth_since(&self, before: &CacheSnapshot) -> CacheGrowth {
        CacheGrowth {
            size_bytes: self.size_bytes as i64 - before.size_bytes as i64,
            file_count: self.file_count as i64 - before.file_count as i64,
        }
    }
}

/// Snapshots one tool's cache directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheAnalyzer {
    cache_dir: Option<PathBuf>,
}

impl CacheAnalyzer {
    /// Analyzer for a known cache directory
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: Some(cache_dir.into()),
        }
    }

    /// Analyzer for a tool without a cache; every snapshot is zero
    pub fn disabled() -> Self {
        Self { cache_dir: None }
    }

    /// Directory being measured, if any
    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    /// Sum regular files under the cache directory.
    ///
    /// A missing directory is "no cache yet" and yields a zero snapshot.
    pub fn snapshot(&self) -> CacheSnapshot {
        let Some(dir) = self.cache_dir.as_deref() else {
            return CacheSnapshot::default();
        };
        if !dir.exists() {
            debug!(dir = %dir.display(), "Cache directory absent, reporting empty cache");
            return CacheSnapshot::default();
        }

        let mut snapshot = CacheSnapshot::default();
        for entry in WalkDir::new(dir).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable cache entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            match entry.metadata() {
                Ok(meta) => {
                    snapshot.size_bytes += meta.len();
                    snapshot.file_count += 1;
                }
                Err(e) => warn!(path = %entry.path().display(), error = %e, "Skipping cache file"),
            }
        }

        debug!(
            dir = %dir.display(),
            size_bytes = snapshot.size_bytes,
            file_count = snapshot.file_count,
            "Cache snapshot"
        );
        snapshot
    }
}
