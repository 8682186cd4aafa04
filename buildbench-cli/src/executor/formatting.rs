//! Output Formatting
//!
//! Human-readable terminal summary of a comparison:
//! - Build times per system, with the difference and the faster system
//! - Peak memory and CPU
//! - Cache growth
//! - Total bundle sizes and per-chunk listing
//! - Failures, when the comparison is partial

use buildbench_report::{
    ComparisonReport, format_bytes, format_duration_ms, format_signed_bytes,
};

/// Format a report for human-readable terminal display
pub fn format_human_output(report: &ComparisonReport) -> String {
    let mut output = String::new();

    output.push('\n');
    output.push_str("Build Comparison Results:\n");
    output.push_str(&"=".repeat(60));
    output.push('\n');

    let width = report
        .results
        .iter()
        .map(|r| r.system.len())
        .max()
        .unwrap_or(8);

    output.push_str("\nBuild Times:\n");
    for result in &report.results {
        let stats = &result.build_time_stats;
        output.push_str(&format!(
            "  {:<width$}  mean {}  median {}  stddev {}  min {}  max {}  ({} runs, {} attempts)\n",
            result.system,
            format_duration_ms(stats.mean),
            format_duration_ms(stats.median),
            format_duration_ms(stats.std_dev),
            format_duration_ms(stats.min),
            format_duration_ms(stats.max),
            stats.sample_count,
            result.attempts,
            width = width
        ));
        if let Some(tool_ms) = result.tool_reported_time_ms {
            output.push_str(&format!(
                "  {:<width$}  tool-reported time {}\n",
                "",
                format_duration_ms(tool_ms as f64),
                width = width
            ));
        }
    }

    if let [baseline, other] = &report.summary.entries[..] {
        let faster = if other.difference_ms < 0.0 {
            &other.system
        } else {
            &baseline.system
        };
        output.push_str(&format!(
            "  Difference: {} ({} faster)\n",
            format_duration_ms(other.difference_ms.abs()),
            faster
        ));
    } else if report.summary.entries.len() > 2 {
        for entry in report.summary.entries.iter().filter(|e| !e.is_baseline) {
            output.push_str(&format!(
                "  {:<width$}  {:.2}x vs baseline ({:+.1}%)\n",
                entry.system,
                entry.speedup,
                entry.relative_change_pct,
                width = width
            ));
        }
    }
    if let Some(fastest) = &report.summary.fastest {
        output.push_str(&format!("  Fastest: {}\n", fastest));
    }

    output.push_str("\nPeak Memory Usage:\n");
    for result in &report.results {
        let peak = result.peak_memory();
        let cpu = result.peak_cpu();
        output.push_str(&format!(
            "  {:<width$}  rss {}  heapUsed {}  heapTotal {}  external {}  cpu {:.1}%\n",
            result.system,
            format_bytes(peak.rss),
            format_bytes(peak.heap_used),
            format_bytes(peak.heap_total),
            format_bytes(peak.external),
            cpu.total_pct,
            width = width
        ));
    }

    output.push_str("\nCache:\n");
    for result in &report.results {
        output.push_str(&format!(
            "  {:<width$}  {} -> {} ({}, {:+} files)\n",
            result.system,
            format_bytes(result.cache_before.size_bytes),
            format_bytes(result.cache_after.size_bytes),
            format_signed_bytes(result.cache_growth.size_bytes),
            result.cache_growth.file_count,
            width = width
        ));
    }

    output.push_str("\nTotal Bundle Sizes:\n");
    for result in &report.results {
        output.push_str(&format!(
            "  {:<width$}  {}\n",
            result.system,
            format_bytes(result.dist_size_bytes),
            width = width
        ));
    }

    output.push_str("\nChunk Analysis:\n");
    for result in &report.results {
        output.push_str(&format!("\n{} Chunks:\n", result.system));
        if result.chunks.is_empty() {
            output.push_str("  (none)\n");
        }
        for (name, info) in &result.chunks {
            output.push_str(&format!("  {}: {}\n", name, format_bytes(info.size_bytes)));
        }
    }

    if !report.failures.is_empty() {
        output.push_str("\nFailures:\n");
        for failure in &report.failures {
            output.push_str(&format!(
                "  ✗ {} [{}] after {} attempts: {}\n",
                failure.system, failure.kind, failure.attempts, failure.message
            ));
        }
    }

    output.push_str(&format!(
        "\nTotal time: {}\n",
        format_duration_ms(report.summary.total_duration_ms)
    ));
    output
}
