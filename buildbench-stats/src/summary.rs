//! Summary Statistics
//!
//! Descriptive statistics over a small, ordered set of build measurements.
//! Build batches are a handful of runs, so every sample counts: no outlier
//! rejection is applied and the standard deviation uses the population divisor.

use crate::median_index;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the aggregator
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StatsError {
    /// No samples were supplied
    #[error("cannot aggregate an empty sample set")]
    EmptyInput,

    /// A sample was NaN or infinite
    #[error("sample {index} is not a finite number ({value})")]
    NonFinite {
        /// Position of the offending sample
        index: usize,
        /// The offending value
        value: f64,
    },
}

/// Descriptive statistics for one build system's measurements
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    /// Arithmetic mean
    pub mean: f64,
    /// Smallest sample
    pub min: f64,
    /// Largest sample
    pub max: f64,
    /// Population standard deviation (divisor N)
    pub std_dev: f64,
    /// Element at index `floor(N/2)` after ascending sort
    pub median: f64,
    /// Number of samples aggregated
    pub sample_count: usize,
}

/// Compute summary statistics for a non-empty sample set.
pub fn compute_stats(samples: &[f64]) -> Result<Stats, StatsError> {
    if samples.is_empty() {
        return Err(StatsError::EmptyInput);
    }
    if let Some((index, &value)) = samples.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(StatsError::NonFinite { index, value });
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    let min = sorted[0];
    let max = sorted[sorted.len() - 1];

    // Rounding in the sum can land just outside the sample range
    let n = samples.len() as f64;
    let mean = (samples.iter().sum::<f64>() / n).clamp(min, max);
    let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;

    Ok(Stats {
        mean,
        min,
        max,
        std_dev: variance.sqrt(),
        median: sorted[median_index(sorted.len())],
        sample_count: sorted.len(),
    })
}
