//! Statistics Computation
//!
//! Build-time statistics for every measured system.
//!
//! Runs only after all measurement has finished, so systems are processed in
//! parallel with Rayon without disturbing any build.

use super::execution::SystemMeasurement;
use buildbench_stats::{Stats, StatsError, compute_stats};
use rayon::prelude::*;

/// Compute build-time statistics per measurement (parallelized with Rayon)
///
/// The returned vector is parallel to `measurements`. A system without
/// accepted runs yields `StatsError::EmptyInput`.
pub fn compute_statistics(measurements: &[SystemMeasurement]) -> Vec<Result<Stats, StatsError>> {
    measurements
        .par_iter()
        .map(|m| compute_stats(&m.durations_ms()))
        .collect()
}
