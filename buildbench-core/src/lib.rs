#![warn(missing_docs)]
//! BuildBench Core - Measurement Runtime
//!
//! This crate provides the pieces that touch the operating system:
//! - `ProcessRunner` for launching a build command in its own process group
//!   with timeout enforcement
//! - `TelemetrySampler` for fixed-cadence memory/CPU sampling on a
//!   dedicated thread
//! - `CacheAnalyzer` / `BundleAnalyzer` for before/after filesystem and
//!   build-manifest inspection
//! - `InstrumentedExecutor`, which pairs a runner and a sampler for one attempt

mod bundle;
mod cache;
mod instrumented;
mod probe;
mod run;
mod runner;
mod sampler;

pub use bundle::{ArtifactSource, BundleAnalysis, BundleAnalyzer, ChunkInfo, bytes_by_extension, dist_size};
pub use cache::{CacheAnalyzer, CacheGrowth, CacheSnapshot};
pub use instrumented::{BuildExecutor, InstrumentedExecutor, SampleTarget};
pub use probe::{MemoryCounters, ProcessGroupProbe, ResourceProbe, ResourceReading, SelfProbe};
pub use run::{BuildRun, CpuPeak, CpuSample, MemoryPeak, MemorySample, ResourceSample};
pub use runner::{BuildOutput, ProcessOutcome, ProcessRunner, RunError, RunningBuild};
pub use sampler::{SamplerConfig, TelemetrySampler};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default sampling cadence in milliseconds
pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 10;

/// Default build timeout in milliseconds (5 minutes)
pub const DEFAULT_TIMEOUT_MS: u64 = 300_000;

/// Default grace window between SIGTERM and SIGKILL on timeout
pub const DEFAULT_KILL_GRACE_MS: u64 = 500;

/// A shell command to run inside a working directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildCommand {
    /// Command line passed to `sh -c`
    pub command: String,
    /// Directory the command runs in
    pub working_directory: PathBuf,
}

impl BuildCommand {
    /// Create a new build command
    pub fn new(command: impl Into<String>, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            working_directory: working_directory.into(),
        }
    }
}

impl std::fmt::Display for BuildCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "`{}` in {}", self.command, self.working_directory.display())
    }
}
