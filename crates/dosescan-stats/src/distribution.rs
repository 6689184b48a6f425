use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    StatsError,
    density::{DensityOptions, DensityPoint, KernelDensity},
    descriptive::DescriptiveStats,
    percentiles::RankPercentiles,
    quartiles::Quartiles,
};

/// Options controlling [`DistributionSummary::summarize`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryOptions {
    /// Drop `None`/NaN entries before summarizing. When disabled, such entries
    /// make the whole sample invalid instead of being coerced to a number.
    pub strip_invalid: bool,
    /// Density grid and bandwidth settings.
    pub density: DensityOptions,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            strip_invalid: true,
            density: DensityOptions::default(),
        }
    }
}

/// Full per-group distribution summary used to draw box and violin plots.
///
/// Combines:
/// - central tendency (mean, median) and split-median quartiles
/// - the 1.5×IQR outlier partition and the whisker bounds it implies
/// - nearest-rank percentiles and fixed-rank values
/// - a Gaussian kernel density curve over a fixed grid
///
/// # Whiskers
///
/// `min_outlier`/`max_outlier` are the most extreme values that are not
/// far-out (beyond 2.0×IQR): outliers inside the far-out fence extend them,
/// far-out values never do, and they never fall inside the regular range.
///
/// # Examples
///
/// ```
/// use dosescan_stats::distribution::{DistributionSummary, SummaryOptions};
///
/// let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 100.0];
/// let summary = DistributionSummary::summarize(values, &SummaryOptions::default()).unwrap();
///
/// assert_eq!(summary.median, 5.5);
/// assert_eq!(summary.q1, 3.0);
/// assert_eq!(summary.q3, 8.0);
/// assert_eq!(summary.outliers, vec![100.0]);
/// assert_eq!(summary.max_regular_value, 9.0);
/// assert_eq!(summary.max_outlier, 9.0); // 100 is far-out
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionSummary {
    /// Number of values summarized (after stripping).
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub q1: f64,
    pub q3: f64,
    /// Smallest value inside the outlier fence.
    pub min_regular_value: f64,
    /// Largest value inside the outlier fence.
    pub max_regular_value: f64,
    /// Lower whisker end: smallest value that is not far-out.
    pub min_outlier: f64,
    /// Upper whisker end: largest value that is not far-out.
    pub max_outlier: f64,
    /// All values beyond the outlier fence, in ascending order.
    pub outliers: Vec<f64>,
    pub one_percentile: f64,
    pub five_percentile: f64,
    pub ten_percentile: f64,
    /// Value at 0-based rank 10; absent for samples of 10 or fewer values.
    pub ten_rank: Option<f64>,
    /// Value at 0-based rank 25; absent for samples of 25 or fewer values.
    pub twenty_five_rank: Option<f64>,
    /// Kernel density curve keyed by 1-based grid index. Empty when the sample
    /// has zero spread (see [`StatsError::DegenerateSample`]).
    pub density: BTreeMap<usize, DensityPoint>,
}

impl DistributionSummary {
    /// Summarizes a sample of plain values.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::InvalidInput`] if nothing is left to summarize, or
    /// if an invalid value is present while `strip_invalid` is disabled.
    pub fn summarize<I>(values: I, options: &SummaryOptions) -> Result<Self, StatsError>
    where
        I: IntoIterator<Item = f64>,
    {
        Self::summarize_optional(values.into_iter().map(Some), options)
    }

    /// Summarizes a sample that may contain missing entries.
    ///
    /// # Errors
    ///
    /// Same as [`Self::summarize`]. Infinite values are always invalid.
    pub fn summarize_optional<I>(values: I, options: &SummaryOptions) -> Result<Self, StatsError>
    where
        I: IntoIterator<Item = Option<f64>>,
    {
        let mut sorted = Vec::new();
        for value in values {
            match value {
                Some(v) if v.is_finite() => sorted.push(v),
                Some(v) if v.is_nan() && options.strip_invalid => {}
                None if options.strip_invalid => {}
                _ => return Err(StatsError::InvalidInput),
            }
        }
        sorted.sort_by(f64::total_cmp);
        Self::from_sorted(&sorted, options)
    }

    /// Summarizes pre-sorted finite values.
    ///
    /// # Panics
    ///
    /// Panics if `sorted_values` is not sorted in ascending order.
    pub fn from_sorted(sorted_values: &[f64], options: &SummaryOptions) -> Result<Self, StatsError> {
        let stats = DescriptiveStats::from_sorted(sorted_values)?;
        let quartiles = Quartiles::from_sorted(sorted_values)?;
        let outlier_fences = quartiles.outlier_fences();
        let far_out_fences = quartiles.far_out_fences();

        let mut min_regular_value = f64::INFINITY;
        let mut max_regular_value = f64::NEG_INFINITY;
        let mut min_outlier = f64::INFINITY;
        let mut max_outlier = f64::NEG_INFINITY;
        let mut outliers = vec![];
        for &value in sorted_values {
            if outlier_fences.is_above(value) {
                outliers.push(value);
                if !far_out_fences.is_above(value) {
                    max_outlier = max_outlier.max(value);
                }
            } else if outlier_fences.is_below(value) {
                outliers.push(value);
                if !far_out_fences.is_below(value) {
                    min_outlier = min_outlier.min(value);
                }
            } else {
                min_regular_value = min_regular_value.min(value);
                max_regular_value = max_regular_value.max(value);
            }
        }
        min_outlier = min_outlier.min(min_regular_value);
        max_outlier = max_outlier.max(max_regular_value);

        let percentiles = RankPercentiles::from_sorted(sorted_values)?;

        let density = match KernelDensity::estimate(sorted_values, stats.std_dev, &options.density)
        {
            Ok(kde) => kde.points,
            Err(StatsError::DegenerateSample) => BTreeMap::new(),
            Err(e) => return Err(e),
        };

        Ok(Self {
            count: stats.count,
            mean: stats.mean,
            median: quartiles.median,
            q1: quartiles.q1,
            q3: quartiles.q3,
            min_regular_value,
            max_regular_value,
            min_outlier,
            max_outlier,
            outliers,
            one_percentile: percentiles.p01,
            five_percentile: percentiles.p05,
            ten_percentile: percentiles.p10,
            ten_rank: percentiles.rank10,
            twenty_five_rank: percentiles.rank25,
            density,
        })
    }

    /// Interquartile range, `Q3 - Q1`.
    #[must_use]
    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }
}
