#![warn(missing_docs)]
//! BuildBench Statistical Engine
//!
//! Reduces repeated build measurements into descriptive statistics:
//! - Arithmetic mean and population standard deviation
//! - Min / max
//! - Median using the fixed `floor(N/2)` index convention
//! - Mean-to-mean comparison between two build systems

mod comparison;
mod summary;

pub use comparison::{MeanComparison, compare_means};
pub use summary::{Stats, StatsError, compute_stats};

/// Index used to pick the median from an ascending-sorted sample of `len` values.
///
/// For even lengths this selects the element just above the midpoint. Kept
/// fixed so medians stay comparable across reports.
pub const fn median_index(len: usize) -> usize {
    len / 2
}
