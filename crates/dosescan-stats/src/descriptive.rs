use crate::StatsError;

/// Descriptive statistics summarizing a dataset.
///
/// This structure contains common measures of central tendency and dispersion
/// for a dataset of finite `f64` values. Variance and standard deviation are
/// the bias-corrected sample estimates (`n - 1` denominator); a single-value
/// sample has zero variance.
///
/// The mean and standard deviation stay finite for any finite input. The
/// variance saturates to `+inf` when its true value exceeds `f64::MAX`.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptiveStats {
    /// The number of values in the dataset.
    pub count: usize,
    /// The minimum value in the dataset.
    pub min: f64,
    /// The maximum value in the dataset.
    pub max: f64,
    /// The arithmetic mean (average) of the dataset.
    pub mean: f64,
    /// The median value of the dataset (mean of the two middle values for even counts).
    pub median: f64,
    /// The sample variance of the dataset.
    pub variance: f64,
    /// The sample standard deviation of the dataset.
    pub std_dev: f64,
}

impl DescriptiveStats {
    /// Computes descriptive statistics from unsorted values.
    ///
    /// This method will sort the values internally before computing statistics.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::InvalidInput`] if the dataset is empty or contains
    /// a non-finite value.
    ///
    /// # Examples
    ///
    /// ```
    /// # use dosescan_stats::descriptive::DescriptiveStats;
    /// let values = [5.0, 2.0, 4.0, 1.0, 3.0];
    /// let stats = DescriptiveStats::new(values).unwrap();
    /// assert_eq!(stats.min, 1.0);
    /// assert_eq!(stats.max, 5.0);
    /// assert_eq!(stats.mean, 3.0);
    /// assert_eq!(stats.median, 3.0);
    /// ```
    pub fn new<I>(values: I) -> Result<Self, StatsError>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut values = values.into_iter().collect::<Vec<_>>();
        if values.iter().any(|v| !v.is_finite()) {
            return Err(StatsError::InvalidInput);
        }
        values.sort_by(f64::total_cmp);
        Self::from_sorted(&values)
    }

    /// Computes descriptive statistics from pre-sorted finite values.
    ///
    /// # Panics
    ///
    /// Panics if `sorted_values` is not sorted in ascending order.
    #[expect(clippy::cast_precision_loss)]
    pub fn from_sorted(sorted_values: &[f64]) -> Result<Self, StatsError> {
        assert!(
            sorted_values.is_sorted_by(|a, b| a <= b),
            "values must be sorted in ascending order"
        );

        let (Some(&min), Some(&max)) = (sorted_values.first(), sorted_values.last()) else {
            return Err(StatsError::InvalidInput);
        };
        let count = sorted_values.len();
        let mean = mean(sorted_values).ok_or(StatsError::InvalidInput)?;
        let median = median_of_sorted(sorted_values).ok_or(StatsError::InvalidInput)?;
        let dof = (count.max(2) - 1) as f64;
        let variance = sum_of_squares(sorted_values, mean) / dof;
        let std_dev = if variance.is_finite() {
            variance.sqrt()
        } else {
            let scale = min.abs().max(max.abs());
            let scaled_mean = mean / scale;
            let scaled_sum = sorted_values
                .iter()
                .map(|v| (v / scale - scaled_mean).powi(2))
                .sum::<f64>();
            scale * (scaled_sum / dof).sqrt()
        };

        Ok(Self {
            count,
            min,
            max,
            mean,
            median,
            variance,
            std_dev,
        })
    }
}

/// Arithmetic mean, or `None` for an empty slice.
///
/// Falls back to a running mean when the plain sum overflows, so finite
/// values near `f64::MAX` still give a finite mean.
///
/// # Examples
///
/// ```
/// # use dosescan_stats::descriptive::mean;
/// assert_eq!(mean(&[1.0, 3.0]), Some(2.0));
/// assert!(mean(&[f64::MAX, f64::MAX]).unwrap().is_finite());
/// ```
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sum = values.iter().sum::<f64>();
    if sum.is_finite() || values.iter().any(|v| !v.is_finite()) {
        return Some(sum / values.len() as f64);
    }
    let running = values
        .iter()
        .enumerate()
        .fold(0.0, |mean, (i, v)| mean + (v / (i + 1) as f64 - mean / (i + 1) as f64));
    Some(running)
}

/// Median of sorted values: the middle element for odd counts, the mean of
/// the two middle elements for even counts.
///
/// # Examples
///
/// ```
/// # use dosescan_stats::descriptive::median_of_sorted;
/// assert_eq!(median_of_sorted(&[1.0, 2.0, 3.0]), Some(2.0));
/// assert_eq!(median_of_sorted(&[1.0, 2.0, 3.0, 4.0]), Some(2.5));
/// assert_eq!(median_of_sorted(&[]), None);
/// ```
#[must_use]
pub fn median_of_sorted(sorted_values: &[f64]) -> Option<f64> {
    let n = sorted_values.len();
    match n {
        0 => None,
        _ if n % 2 == 1 => Some(sorted_values[n / 2]),
        _ => Some(f64::midpoint(sorted_values[n / 2 - 1], sorted_values[n / 2])),
    }
}

/// Sum of squared deviations from `center`.
#[must_use]
pub fn sum_of_squares(values: &[f64], center: f64) -> f64 {
    values.iter().map(|v| (v - center).powi(2)).sum()
}
