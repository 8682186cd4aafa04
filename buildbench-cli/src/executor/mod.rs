//! Comparison Executor
//!
//! Measures each configured build system and turns the measurements into a
//! comparison report.
//!
//! ## Pipeline Overview
//!
//! ```text
//! SystemTarget (resolved from buildbench.toml)
//!       │
//!       ▼
//! ┌─────────────┐
//! │  execution  │  Cache snapshot → N instrumented builds (with retries) →
//! └──────┬──────┘  cache snapshot → bundle analysis
//!        │
//!        ▼
//! ┌─────────────┐
//! │ statistics  │  Build-time stats per system (parallel)
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │   report    │  ComparisonReport with failures and summary
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │ formatting  │  Human-readable output
//! └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`execution`] - Orchestration of measured builds, retry policy
//! - [`statistics`] - Parallel statistics computation
//! - [`report`] - Report building
//! - [`formatting`] - Human-readable output formatting
//! - [`metadata`] - System metadata collection

mod execution;
mod formatting;
mod metadata;
mod report;
mod statistics;

// Re-export public API
pub use execution::{
    AttemptFailure, BenchError, BenchmarkOrchestrator, ComparisonOutcome, ExecutionConfig,
    FailedSystem, IterationState, SystemMeasurement, SystemTarget,
};
pub use formatting::format_human_output;
pub use metadata::build_report_meta;
pub use report::build_report;
pub use statistics::compute_statistics;

#[cfg(test)]
pub(crate) use execution::testing;
