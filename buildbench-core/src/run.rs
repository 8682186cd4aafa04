//! Per-run measurement records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One sampling tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    /// Wall-clock time of the tick in epoch milliseconds
    pub timestamp_ms: u64,
    /// Private resident bytes
    pub heap_used: u64,
    /// Data + stack segment bytes
    pub heap_total: u64,
    /// Resident set size in bytes
    pub rss: u64,
    /// Shared resident bytes
    pub external: u64,
    /// User CPU time consumed since the previous tick, as % of wall time
    pub cpu_user_pct: f64,
    /// System CPU time consumed since the previous tick, as % of wall time
    pub cpu_system_pct: f64,
}

/// Memory projection of a [`ResourceSample`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySample {
    /// Wall-clock time of the tick in epoch milliseconds
    pub timestamp_ms: u64,
    /// Private resident bytes
    pub heap_used: u64,
    /// Data + stack segment bytes
    pub heap_total: u64,
    /// Resident set size in bytes
    pub rss: u64,
    /// Shared resident bytes
    pub external: u64,
}

/// CPU projection of a [`ResourceSample`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CpuSample {
    /// Wall-clock time of the tick in epoch milliseconds
    pub timestamp_ms: u64,
    /// User CPU % over the tick
    pub user_pct: f64,
    /// System CPU % over the tick
    pub system_pct: f64,
}

impl From<&ResourceSample> for MemorySample {
    fn from(s: &ResourceSample) -> Self {
        Self {
            timestamp_ms: s.timestamp_ms,
            heap_used: s.heap_used,
            heap_total: s.heap_total,
            rss: s.rss,
            external: s.external,
        }
    }
}

impl From<&ResourceSample> for CpuSample {
    fn from(s: &ResourceSample) -> Self {
        Self {
            timestamp_ms: s.timestamp_ms,
            user_pct: s.cpu_user_pct,
            system_pct: s.cpu_system_pct,
        }
    }
}

/// Field-wise maximum memory over a timeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryPeak {
    /// Highest private resident bytes
    pub heap_used: u64,
    /// Highest data + stack segment bytes
    pub heap_total: u64,
    /// Highest resident set size
    pub rss: u64,
    /// Highest shared resident bytes
    pub external: u64,
}

/// Field-wise maximum CPU usage over a timeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuPeak {
    /// Highest user CPU %
    pub user_pct: f64,
    /// Highest system CPU %
    pub system_pct: f64,
    /// Highest single-tick `user + system`
    pub total_pct: f64,
}

impl MemoryPeak {
    /// Field-wise maximum of two peaks
    pub fn merge(self, other: Self) -> Self {
        Self {
            heap_used: self.heap_used.max(other.heap_used),
            heap_total: self.heap_total.max(other.heap_total),
            rss: self.rss.max(other.rss),
            external: self.external.max(other.external),
        }
    }

    /// Fold a timeline into its peaks (all zero when empty)
    pub fn from_timeline(timeline: &[MemorySample]) -> Self {
        timeline
            .iter()
            .map(Self::from)
            .fold(Self::default(), Self::merge)
    }
}

impl From<&MemorySample> for MemoryPeak {
    fn from(s: &MemorySample) -> Self {
        Self {
            heap_used: s.heap_used,
            heap_total: s.heap_total,
            rss: s.rss,
            external: s.external,
        }
    }
}

impl CpuPeak {
    /// Field-wise maximum of two peaks
    pub fn merge(self, other: Self) -> Self {
        Self {
            user_pct: self.user_pct.max(other.user_pct),
            system_pct: self.system_pct.max(other.system_pct),
            total_pct: self.total_pct.max(other.total_pct),
        }
    }

    /// Fold a timeline into its peaks (all zero when empty)
    pub fn from_timeline(timeline: &[CpuSample]) -> Self {
        timeline
            .iter()
            .map(Self::from)
            .fold(Self::default(), Self::merge)
    }
}

impl From<&CpuSample> for CpuPeak {
    fn from(s: &CpuSample) -> Self {
        Self {
            user_pct: s.user_pct,
            system_pct: s.system_pct,
            total_pct: s.user_pct + s.system_pct,
        }
    }
}

/// One completed execution attempt of a build command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRun {
    /// Command line that was run
    pub command: String,
    /// When the process was spawned
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration from spawn to exit
    pub duration_ms: u64,
    /// Exit code, or `128 + signal`
    pub exit_code: i32,
    /// Memory counters per tick
    pub memory_timeline: Vec<MemorySample>,
    /// CPU usage per tick
    pub cpu_timeline: Vec<CpuSample>,
    /// Peaks of `memory_timeline`
    pub peak_memory: MemoryPeak,
    /// Peaks of `cpu_timeline`
    pub peak_cpu: CpuPeak,
}

impl BuildRun {
    /// Assemble a run from its sampled timeline, deriving both projections and peaks.
    pub fn from_samples(
        command: impl Into<String>,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        exit_code: i32,
        samples: &[ResourceSample],
    ) -> Self {
        let memory_timeline: Vec<MemorySample> = samples.iter().map(MemorySample::from).collect();
        let cpu_timeline: Vec<CpuSample> = samples.iter().map(CpuSample::from).collect();
        let peak_memory = MemoryPeak::from_timeline(&memory_timeline);
        let peak_cpu = CpuPeak::from_timeline(&cpu_timeline);

        Self {
            command: command.into(),
            started_at,
            duration_ms,
            exit_code,
            memory_timeline,
            cpu_timeline,
            peak_memory,
            peak_cpu,
        }
    }

    /// Whether the run may be accepted into aggregation
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}
