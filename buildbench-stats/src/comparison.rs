//! Mean Comparison
//!
//! Relative change between two build systems' mean build times. The sample
//! counts involved (a few runs per system) are far too small for resampling,
//! so the comparison is a direct ratio of means.

use crate::summary::Stats;
use serde::{Deserialize, Serialize};

/// Result of comparing a candidate's mean against a baseline's mean
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeanComparison {
    /// `candidate.mean - baseline.mean`
    pub absolute_change: f64,
    /// Relative change in percent: `(candidate - baseline) / baseline * 100`
    pub relative_change: f64,
    /// `baseline.mean / candidate.mean` (>1.0 = candidate is faster)
    pub speedup: f64,
}

/// Compare candidate against baseline by mean.
///
/// A zero mean on either side yields a relative change of 0 and a speedup of 1.
pub fn compare_means(baseline: &Stats, candidate: &Stats) -> MeanComparison {
    let absolute_change = candidate.mean - baseline.mean;
    let relative_change = if baseline.mean > 0.0 {
        (absolute_change / baseline.mean) * 100.0
    } else {
        0.0
    };
    let speedup = if baseline.mean > 0.0 && candidate.mean > 0.0 {
        baseline.mean / candidate.mean
    } else {
        1.0
    };

    MeanComparison {
        absolute_change,
        relative_change,
        speedup,
    }
}
