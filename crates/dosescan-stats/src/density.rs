use std::{collections::BTreeMap, f64::consts::PI};

use serde::{Deserialize, Serialize};

use crate::StatsError;

/// Number of grid points the density is evaluated on.
pub const DEFAULT_GRID_POINTS: usize = 100;

/// Extra narrowing applied on top of Silverman's rule-of-thumb bandwidth.
///
/// Tuned to reproduce existing violin shapes rather than derived from theory;
/// pending review by a domain expert.
pub const DEFAULT_BANDWIDTH_DIVISOR: f64 = 10.0;

/// Grid and bandwidth settings for [`KernelDensity::estimate`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DensityOptions {
    /// Number of evaluation points `G`; the grid is `x_i = i * max / G` for `i = 1..=G`.
    pub grid_points: usize,
    /// Divisor applied to the Silverman bandwidth.
    pub bandwidth_divisor: f64,
}

impl Default for DensityOptions {
    fn default() -> Self {
        Self {
            grid_points: DEFAULT_GRID_POINTS,
            bandwidth_divisor: DEFAULT_BANDWIDTH_DIVISOR,
        }
    }
}

/// One evaluated grid point of a density curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DensityPoint {
    pub x: f64,
    pub density: f64,
}

/// Gaussian kernel density estimate over a fixed grid.
///
/// The grid runs from `max / G` up to `max` in `G` equal steps, where `max` is
/// the largest sample value, and is keyed by the 1-based grid index.
///
/// # Examples
///
/// ```
/// use dosescan_stats::{
///     density::{DensityOptions, KernelDensity},
///     descriptive::DescriptiveStats,
/// };
///
/// let values = [1.0, 2.0, 2.5, 3.0, 4.0, 8.0];
/// let stats = DescriptiveStats::from_sorted(&values).unwrap();
/// let kde = KernelDensity::estimate(&values, stats.std_dev, &DensityOptions::default()).unwrap();
///
/// assert_eq!(kde.points.len(), 100);
/// assert_eq!(kde.points[&100].x, 8.0);
/// assert!(kde.points.values().all(|p| p.density.is_finite() && p.density >= 0.0));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelDensity {
    pub bandwidth: f64,
    pub points: BTreeMap<usize, DensityPoint>,
}

impl KernelDensity {
    /// Estimates the density of a sorted finite sample with known sample standard deviation.
    ///
    /// # Errors
    ///
    /// - [`StatsError::InvalidInput`] if the sample is empty or `grid_points` is zero.
    /// - [`StatsError::DegenerateSample`] if the sample has zero (or non-finite)
    ///   spread, which would make the bandwidth zero.
    #[expect(clippy::cast_precision_loss)]
    pub fn estimate(
        sorted_values: &[f64],
        std_dev: f64,
        options: &DensityOptions,
    ) -> Result<Self, StatsError> {
        let Some(&max) = sorted_values.last() else {
            return Err(StatsError::InvalidInput);
        };
        if options.grid_points == 0 {
            return Err(StatsError::InvalidInput);
        }

        let bandwidth =
            silverman_bandwidth(std_dev, sorted_values.len(), options.bandwidth_divisor);
        if !(bandwidth.is_finite() && bandwidth > 0.0) {
            return Err(StatsError::DegenerateSample);
        }

        let norm = 1.0 / (sorted_values.len() as f64 * bandwidth);
        let step = max / options.grid_points as f64;
        let points = (1..=options.grid_points)
            .map(|i| {
                let x = i as f64 * step;
                let sum = sorted_values
                    .iter()
                    .map(|v| gaussian_kernel((x - v) / bandwidth))
                    .sum::<f64>();
                (i, DensityPoint { x, density: norm * sum })
            })
            .collect();

        Ok(Self { bandwidth, points })
    }
}

/// Silverman's rule-of-thumb bandwidth `1.06 * sigma * n^(-1/5)`, divided by `divisor`.
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn silverman_bandwidth(std_dev: f64, count: usize, divisor: f64) -> f64 {
    1.06 * std_dev * (count as f64).powf(-0.2) / divisor
}

/// Standard normal probability density.
#[must_use]
pub fn gaussian_kernel(u: f64) -> f64 {
    (-u * u / 2.0).exp() / (2.0 * PI).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_sample_is_degenerate() {
        let values = [3.0, 3.0, 3.0, 3.0];
        let result = KernelDensity::estimate(&values, 0.0, &DensityOptions::default());
        assert_eq!(result, Err(StatsError::DegenerateSample));
    }

    #[test]
    fn test_empty_sample_is_invalid() {
        let result = KernelDensity::estimate(&[], 1.0, &DensityOptions::default());
        assert_eq!(result, Err(StatsError::InvalidInput));
    }

    #[test]
    fn test_zero_grid_is_invalid() {
        let options = DensityOptions {
            grid_points: 0,
            ..DensityOptions::default()
        };
        let result = KernelDensity::estimate(&[1.0, 2.0], 1.0, &options);
        assert_eq!(result, Err(StatsError::InvalidInput));
    }

    #[test]
    fn test_bandwidth_formula() {
        let h = silverman_bandwidth(2.0, 32, 10.0);
        // 32^(-1/5) = 0.5
        assert!((h - 1.06 * 2.0 * 0.5 / 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_density_matches_hand_computation() {
        let values = [1.0, 3.0];
        let options = DensityOptions {
            grid_points: 3,
            bandwidth_divisor: 1.0,
        };
        let kde = KernelDensity::estimate(&values, 1.0, &options).unwrap();
        let h = kde.bandwidth;
        let expected =
            (gaussian_kernel((2.0 - 1.0) / h) + gaussian_kernel((2.0 - 3.0) / h)) / (2.0 * h);
        assert_eq!(kde.points[&2].x, 2.0);
        assert!((kde.points[&2].density - expected).abs() < 1e-12);
        assert_eq!(kde.points.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_density_peaks_near_sample_mass() {
        let values = [9.0, 10.0, 10.0, 10.0, 11.0];
        let kde = KernelDensity::estimate(&values, 0.7071, &DensityOptions::default()).unwrap();
        let (peak_idx, _) = kde
            .points
            .iter()
            .max_by(|a, b| a.1.density.total_cmp(&b.1.density))
            .unwrap();
        assert_eq!(*peak_idx, 91);
    }
}
