use serde::{Deserialize, Serialize};

use crate::StatsError;

/// Nearest-rank percentile and fixed-rank lookups used by distribution summaries.
///
/// Percentiles are read straight off the sorted sample without interpolation:
/// the `p`-th percentile is the element at index `ceil(p * n / 100)`, clamped
/// to the last element. Rank lookups return the element at a fixed 0-based
/// index and are absent when the sample is not larger than that index.
///
/// # Examples
///
/// ```
/// use dosescan_stats::percentiles::RankPercentiles;
///
/// let values: Vec<f64> = (0..30).map(f64::from).collect();
/// let percentiles = RankPercentiles::from_sorted(&values).unwrap();
///
/// assert_eq!(percentiles.p01, 1.0);
/// assert_eq!(percentiles.p05, 2.0);
/// assert_eq!(percentiles.p10, 3.0);
/// assert_eq!(percentiles.rank10, Some(10.0));
/// assert_eq!(percentiles.rank25, Some(25.0));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankPercentiles {
    /// Value at the 1st percentile.
    pub p01: f64,
    /// Value at the 5th percentile.
    pub p05: f64,
    /// Value at the 10th percentile.
    pub p10: f64,
    /// Value at index 10, present only when the sample has more than 10 values.
    pub rank10: Option<f64>,
    /// Value at index 25, present only when the sample has more than 25 values.
    pub rank25: Option<f64>,
}

impl RankPercentiles {
    /// Computes the rank-based lookups from sorted values.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::InvalidInput`] if `sorted_values` is empty.
    ///
    /// # Panics
    ///
    /// Panics if `sorted_values` is not sorted in ascending order.
    pub fn from_sorted(sorted_values: &[f64]) -> Result<Self, StatsError> {
        assert!(
            sorted_values.is_sorted_by(|a, b| a <= b),
            "values must be sorted in ascending order"
        );
        let percentile =
            |p| nearest_rank_percentile(sorted_values, p).ok_or(StatsError::InvalidInput);
        Ok(Self {
            p01: percentile(1)?,
            p05: percentile(5)?,
            p10: percentile(10)?,
            rank10: rank_value(sorted_values, 10),
            rank25: rank_value(sorted_values, 25),
        })
    }
}

/// Computes a single nearest-rank percentile from sorted data.
///
/// The index is `ceil(n * percent / 100)` computed in integer arithmetic, then
/// clamped to `n - 1` so that tiny samples still yield their largest value
/// instead of indexing past the end.
///
/// Returns `None` if the input is empty.
///
/// # Examples
///
/// ```
/// use dosescan_stats::percentiles::nearest_rank_percentile;
///
/// let values = [1.0, 2.0, 3.0, 4.0, 5.0];
/// assert_eq!(nearest_rank_percentile(&values, 5), Some(2.0));
/// assert_eq!(nearest_rank_percentile(&values, 100), Some(5.0));
/// assert_eq!(nearest_rank_percentile(&[], 5), None);
/// ```
#[must_use]
pub fn nearest_rank_percentile(sorted_values: &[f64], percent: usize) -> Option<f64> {
    let n = sorted_values.len();
    let last = n.checked_sub(1)?;
    let idx = (n * percent).div_ceil(100).min(last);
    Some(sorted_values[idx])
}

/// Returns the element at a fixed 0-based rank, or `None` when the sample
/// has `rank` or fewer values.
#[must_use]
pub fn rank_value(sorted_values: &[f64], rank: usize) -> Option<f64> {
    sorted_values.get(rank).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_fields_absent_for_small_samples() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        let percentiles = RankPercentiles::from_sorted(&values).unwrap();
        assert_eq!(percentiles.rank10, None);
        assert_eq!(percentiles.rank25, None);
    }

    #[test]
    fn test_rank10_present_from_eleven_values() {
        let values: Vec<f64> = (0..11).map(f64::from).collect();
        let percentiles = RankPercentiles::from_sorted(&values).unwrap();
        assert_eq!(percentiles.rank10, Some(10.0));
        assert_eq!(percentiles.rank25, None);
    }

    #[test]
    fn test_single_value_sample_clamps_index() {
        let percentiles = RankPercentiles::from_sorted(&[42.0]).unwrap();
        assert_eq!(percentiles.p01, 42.0);
        assert_eq!(percentiles.p05, 42.0);
        assert_eq!(percentiles.p10, 42.0);
    }

    #[test]
    fn test_integer_ceiling_is_exact() {
        // 5% of 300 is exactly 15; a floating-point product would round up to 16.
        let values: Vec<f64> = (0..300).map(f64::from).collect();
        assert_eq!(nearest_rank_percentile(&values, 5), Some(15.0));
        assert_eq!(nearest_rank_percentile(&values, 1), Some(3.0));
    }

    #[test]
    fn test_empty_is_invalid() {
        assert_eq!(
            RankPercentiles::from_sorted(&[]),
            Err(StatsError::InvalidInput)
        );
    }
}
