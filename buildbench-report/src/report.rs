//! Report Data Structures
//!
//! The comparison report is the single source for every output: the JSON
//! data file is its serialization, and the HTML and terminal renderings read
//! from it.

use buildbench_core::{
    CacheGrowth, CacheSnapshot, ChunkInfo, CpuPeak, CpuSample, MemoryPeak, MemorySample,
    bytes_by_extension,
};
use buildbench_stats::Stats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Complete comparison report, the content of the JSON data file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    /// Run metadata
    pub meta: ReportMeta,
    /// Measured systems, in configuration order
    pub results: Vec<BenchmarkResult>,
    /// Systems that failed or were not measured
    pub failures: Vec<SystemFailure>,
    /// Cross-system summary
    pub summary: ComparisonSummary,
}

impl ComparisonReport {
    /// Whether every configured system was measured
    pub fn is_complete(&self) -> bool {
        self.summary.complete
    }

    /// Result for a named system
    pub fn result(&self, system: &str) -> Option<&BenchmarkResult> {
        self.results.iter().find(|r| r.system == system)
    }
}

/// Report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMeta {
    /// Version of the JSON layout
    pub schema_version: u32,
    /// buildbench version that wrote the report
    pub version: String,
    /// When the report was built (UTC)
    pub timestamp: DateTime<Utc>,
    /// Current git commit, when run inside a checkout
    pub git_commit: Option<String>,
    /// Current git branch, when run inside a checkout
    pub git_branch: Option<String>,
    /// Host information
    pub system: SystemInfo,
    /// Runner settings
    pub config: ReportConfig,
}

/// Run configuration captured in report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Measured builds per system
    pub iterations: usize,
    /// Extra attempts allowed per iteration
    pub retries: u32,
    /// Per-build timeout
    pub timeout_ms: u64,
    /// Wait between SIGTERM and SIGKILL
    pub kill_grace_ms: u64,
    /// Sampling cadence
    pub sample_interval_ms: u64,
    /// `self` or `build`
    pub sample_target: String,
}

/// Host information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Operating system family
    pub os: String,
    /// Kernel release
    pub os_version: String,
    /// CPU architecture
    pub arch: String,
    /// CPU model name
    pub cpu: String,
    /// Available parallelism
    pub cpu_cores: u32,
    /// Total memory in GiB
    pub memory_gb: f64,
}

/// Aggregated measurements for one build system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    /// System name from the configuration
    pub system: String,
    /// Tool family (`vite`, `webpack`, `other`)
    pub tool: String,
    /// Statistics over `durations_ms`
    pub build_time_stats: Stats,
    /// Durations of the accepted runs, in run order
    pub durations_ms: Vec<u64>,
    /// Memory peaks, parallel to `durations_ms`
    pub peak_memory_per_run: Vec<MemoryPeak>,
    /// CPU peaks, parallel to `durations_ms`
    pub peak_cpu_per_run: Vec<CpuPeak>,
    /// Memory timeline of every accepted run
    pub memory_timelines: Vec<Vec<MemorySample>>,
    /// CPU timeline of every accepted run
    pub cpu_timelines: Vec<Vec<CpuSample>>,
    /// Index of the run whose duration is the median, used for timeline charts
    pub representative_run: usize,
    /// Cache before the first build
    pub cache_before: CacheSnapshot,
    /// Cache after the last build
    pub cache_after: CacheSnapshot,
    /// `cache_after - cache_before`
    pub cache_growth: CacheGrowth,
    /// Size of the visible files in the output directory
    pub dist_size_bytes: u64,
    /// Emitted chunks from the tool's artifact
    pub chunks: BTreeMap<String, ChunkInfo>,
    /// Sum of `chunks`
    pub chunk_total_bytes: u64,
    /// Build time reported by the tool itself
    pub tool_reported_time_ms: Option<u64>,
    /// Process launches including retries
    pub attempts: u32,
}

impl BenchmarkResult {
    /// Field-wise memory peak across all runs
    pub fn peak_memory(&self) -> MemoryPeak {
        self.peak_memory_per_run
            .iter()
            .copied()
            .fold(MemoryPeak::default(), MemoryPeak::merge)
    }

    /// Field-wise CPU peak across all runs
    pub fn peak_cpu(&self) -> CpuPeak {
        self.peak_cpu_per_run
            .iter()
            .copied()
            .fold(CpuPeak::default(), CpuPeak::merge)
    }

    /// Memory timeline of the median-duration run
    pub fn representative_memory_timeline(&self) -> &[MemorySample] {
        self.memory_timelines
            .get(self.representative_run)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// CPU timeline of the median-duration run
    pub fn representative_cpu_timeline(&self) -> &[CpuSample] {
        self.cpu_timelines
            .get(self.representative_run)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Chunk bytes grouped by file extension
    pub fn bytes_by_extension(&self) -> BTreeMap<String, u64> {
        bytes_by_extension(self.chunks.values())
    }
}

/// A system whose batch was aborted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemFailure {
    /// System name from the configuration
    pub system: String,
    /// `spawn`, `build-failed`, `stats` or `skipped`
    pub kind: String,
    /// Error with its causes
    pub message: String,
    /// Process launches before the failure
    pub attempts: u32,
}

/// Cross-system summary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComparisonSummary {
    /// One entry per measured system
    pub entries: Vec<SummaryEntry>,
    /// System with the lowest mean build time
    pub fastest: Option<String>,
    /// False when any system failed or was not measured
    pub complete: bool,
    /// Wall-clock time of the whole comparison
    pub total_duration_ms: f64,
}

/// Mean build time of one system relative to the first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryEntry {
    /// System name
    pub system: String,
    /// Mean build time
    pub mean_build_time_ms: f64,
    /// This mean minus the baseline mean (negative = faster)
    pub difference_ms: f64,
    /// `difference_ms` as a percentage of the baseline mean
    pub relative_change_pct: f64,
    /// Baseline mean / this mean (>1.0 = faster than baseline)
    pub speedup: f64,
    /// Whether this is the first measured system
    pub is_baseline: bool,
}
