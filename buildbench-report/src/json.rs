//! JSON Output

use crate::report::ComparisonReport;

/// Version of the JSON data file layout
pub const SCHEMA_VERSION: u32 = 1;

/// Generate a prettified JSON report.
pub fn generate_json_report(report: &ComparisonReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}
