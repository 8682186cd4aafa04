//! Comparison Planner
//!
//! Builds the execution plan by filtering configured systems.
//!
//! Filtering options:
//! - Regex pattern matching on system name
//! - Tool filtering
//!
//! Ordering: systems keep their configuration order, so the first selected
//! system is the baseline for speedups.

use crate::config::{SystemConfig, ToolKind};

/// Execution plan for a comparison
pub struct ExecutionPlan<'a> {
    /// Ordered list of systems to measure
    pub systems: Vec<&'a SystemConfig>,
}

/// Build execution plan from configured systems
pub fn build_plan<'a>(
    systems: impl IntoIterator<Item = &'a SystemConfig>,
    filter: Option<&regex::Regex>,
    tool: Option<ToolKind>,
) -> ExecutionPlan<'a> {
    let selected = systems
        .into_iter()
        .filter(|s| filter.is_none_or(|re| re.is_match(&s.name)))
        .filter(|s| tool.is_none_or(|t| s.tool == t))
        .collect();

    ExecutionPlan { systems: selected }
}
