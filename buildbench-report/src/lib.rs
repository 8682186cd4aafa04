#![warn(missing_docs)]
//! BuildBench Report - Reporting and Visualization
//!
//! Generates the comparison outputs:
//! - JSON data file (machine-readable, always written)
//! - HTML (single-file Chart.js dashboard embedding the same data)
//!
//! Terminal formatting lives in the CLI; this crate only owns the data model
//! and the file renderers.

mod format;
mod html;
mod json;
mod report;

pub use format::{format_bytes, format_duration_ms, format_signed_bytes};
pub use html::{ChartData, Composition, TimelineSeries, generate_html_report};
pub use json::{SCHEMA_VERSION, generate_json_report};
pub use report::{
    BenchmarkResult, ComparisonReport, ComparisonSummary, ReportConfig, ReportMeta,
    SummaryEntry, SystemFailure, SystemInfo,
};

/// Terminal output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable terminal summary
    #[default]
    Human,
    /// The JSON data file content on stdout
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" | "text" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}
