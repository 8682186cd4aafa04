//! Report Building
//!
//! Constructs the comparison report from the orchestrator's outcome and the
//! per-system statistics.
//!
//! ## Pipeline
//!
//! ```text
//! SystemMeasurement + Result<Stats>
//!              │
//!              ▼
//!   ┌─────────────────────┐
//!   │  BenchmarkResult    │  timelines, peaks, cache growth, chunks
//!   └──────────┬──────────┘   (built in parallel)
//!              │
//!              ▼
//!   ┌─────────────────────┐
//!   │  ComparisonReport   │  + failures + summary (speedups, fastest)
//!   └─────────────────────┘
//! ```

use super::execution::{BenchError, ComparisonOutcome, ExecutionConfig, SystemMeasurement};
use super::metadata::build_report_meta;
use buildbench_report::{
    BenchmarkResult, ComparisonReport, ComparisonSummary, SummaryEntry, SystemFailure,
};
use buildbench_stats::{Stats, StatsError, compare_means, median_index};
use rayon::prelude::*;

/// Index of the run whose duration sits at the median position
fn representative_run(durations_ms: &[u64]) -> usize {
    if durations_ms.is_empty() {
        return 0;
    }
    let mut order: Vec<usize> = (0..durations_ms.len()).collect();
    order.sort_by_key(|&i| durations_ms[i]);
    order[median_index(order.len())]
}

/// Error message including its source chain
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn benchmark_result(measurement: &SystemMeasurement, stats: Stats) -> BenchmarkResult {
    let durations_ms: Vec<u64> = measurement.runs.iter().map(|r| r.duration_ms).collect();
    BenchmarkResult {
        system: measurement.system.clone(),
        tool: measurement.tool.clone(),
        build_time_stats: stats,
        representative_run: representative_run(&durations_ms),
        durations_ms,
        peak_memory_per_run: measurement.runs.iter().map(|r| r.peak_memory).collect(),
        peak_cpu_per_run: measurement.runs.iter().map(|r| r.peak_cpu).collect(),
        memory_timelines: measurement
            .runs
            .iter()
            .map(|r| r.memory_timeline.clone())
            .collect(),
        cpu_timelines: measurement
            .runs
            .iter()
            .map(|r| r.cpu_timeline.clone())
            .collect(),
        cache_before: measurement.cache_before,
        cache_after: measurement.cache_after,
        cache_growth: measurement.cache_after.growth_since(&measurement.cache_before),
        dist_size_bytes: measurement.dist_size_bytes,
        chunks: measurement.bundle.chunks.clone(),
        chunk_total_bytes: measurement.bundle.total_bytes(),
        tool_reported_time_ms: measurement.bundle.tool_reported_time_ms,
        attempts: measurement.attempts,
    }
}

fn system_failure(error: &BenchError, attempts: u32) -> SystemFailure {
    SystemFailure {
        system: error.system().to_string(),
        kind: error.kind().to_string(),
        message: error_chain(error),
        attempts,
    }
}

fn summarize(results: &[BenchmarkResult], complete: bool, total_duration_ms: f64) -> ComparisonSummary {
    let Some(baseline) = results.first() else {
        return ComparisonSummary {
            complete,
            total_duration_ms,
            ..Default::default()
        };
    };

    let entries = results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let cmp = compare_means(&baseline.build_time_stats, &r.build_time_stats);
            SummaryEntry {
                system: r.system.clone(),
                mean_build_time_ms: r.build_time_stats.mean,
                difference_ms: cmp.absolute_change,
                relative_change_pct: cmp.relative_change,
                speedup: cmp.speedup,
                is_baseline: i == 0,
            }
        })
        .collect();

    let fastest = results
        .iter()
        .min_by(|a, b| a.build_time_stats.mean.total_cmp(&b.build_time_stats.mean))
        .map(|r| r.system.clone());

    ComparisonSummary {
        entries,
        fastest,
        complete,
        total_duration_ms,
    }
}

/// Build the complete report
///
/// `stats` must be parallel to `outcome.measurements`, as returned by
/// [`compute_statistics`](super::compute_statistics).
pub fn build_report(
    outcome: &ComparisonOutcome,
    stats: &[Result<Stats, StatsError>],
    config: &ExecutionConfig,
) -> ComparisonReport {
    let built: Vec<Result<BenchmarkResult, SystemFailure>> = outcome
        .measurements
        .par_iter()
        .zip(stats.par_iter())
        .map(|(measurement, stats)| match stats {
            Ok(stats) => Ok(benchmark_result(measurement, *stats)),
            Err(source) => {
                let error = BenchError::Stats {
                    system: measurement.system.clone(),
                    source: source.clone(),
                };
                Err(system_failure(&error, measurement.attempts))
            }
        })
        .collect();

    let mut results = Vec::with_capacity(built.len());
    let mut failures = Vec::new();
    for entry in built {
        match entry {
            Ok(result) => results.push(result),
            Err(failure) => failures.push(failure),
        }
    }

    if let Some(failed) = &outcome.failure {
        failures.push(system_failure(&failed.error, failed.attempts));
    }
    failures.extend(outcome.skipped.iter().map(|system| SystemFailure {
        system: system.clone(),
        kind: "skipped".to_string(),
        message: "Not measured after an earlier failure".to_string(),
        attempts: 0,
    }));

    let complete = outcome.is_complete() && results.len() == outcome.measurements.len();
    let summary = summarize(&results, complete, outcome.duration_ms);

    ComparisonReport {
        meta: build_report_meta(config),
        results,
        failures,
        summary,
    }
}
