#![warn(missing_docs)]
//! # BuildBench
//!
//! Harness for comparing build systems on the same project:
//! - **Repeated builds**: each system's build command runs N times, with
//!   retries on non-zero exits and timeouts
//! - **Resource sampling**: memory and CPU timelines recorded at a fixed
//!   cadence while each build runs
//! - **Cache and bundle analysis**: cache growth across the batch and
//!   per-chunk sizes from the tool's manifest or stats dump
//! - **Reports**: human-readable terminal output, a JSON data file and a
//!   self-contained HTML report with charts
//!
//! ## Quick Start
//!
//! ```ignore
//! use buildbench::prelude::*;
//!
//! let config = BuildBenchConfig::load("buildbench.toml")?;
//! let exec = config.execution_config()?;
//! let targets: Vec<SystemTarget> = config.systems.iter().map(|s| s.target(&config.root)).collect();
//! let orchestrator = BenchmarkOrchestrator::new(exec.instrumented_executor(), &exec);
//! let report = compare(&orchestrator, &targets, &exec);
//! println!("{}", format_human_output(&report));
//! ```

// Re-export measurement runtime
pub use buildbench_core::{
    ArtifactSource, BuildCommand, BuildExecutor, BuildRun, BundleAnalysis, BundleAnalyzer,
    CacheAnalyzer, CacheGrowth, CacheSnapshot, ChunkInfo, InstrumentedExecutor, ProcessRunner,
    RunError, SampleTarget, SamplerConfig, TelemetrySampler, dist_size,
};

// Re-export stats
pub use buildbench_stats::{MeanComparison, Stats, StatsError, compare_means, compute_stats};

// Re-export report model and generators
pub use buildbench_report::{
    BenchmarkResult, ComparisonReport, ComparisonSummary, OutputFormat, SystemFailure,
    format_bytes, format_duration_ms, generate_html_report, generate_json_report,
};

// Re-export orchestration
pub use buildbench_cli::{
    BenchError, BenchmarkOrchestrator, BuildBenchConfig, ExecutionConfig, SystemConfig,
    SystemTarget, ToolKind, compare, format_human_output, write_outputs,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BenchmarkOrchestrator, BuildBenchConfig, ComparisonReport, ExecutionConfig, SystemTarget,
        compare, format_human_output, write_outputs,
    };
}
