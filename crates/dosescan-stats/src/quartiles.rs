use serde::{Deserialize, Serialize};

use crate::{StatsError, descriptive::median_of_sorted};

/// IQR multiplier for the outlier fence.
pub const OUTLIER_IQR_MULTIPLIER: f64 = 1.5;

/// IQR multiplier for the far-out fence.
pub const FAR_OUT_IQR_MULTIPLIER: f64 = 2.0;

/// Quartiles computed with the split-median (Tukey hinge) rule.
///
/// For an odd count `n > 1`, Q1 is the median of indices `0..=n/2` and Q3 the
/// median of indices `n/2..=n-1`, so the middle element belongs to both halves.
/// For an even count the halves are `0..=n/2-1` and `n/2..=n-1`.
///
/// # Examples
///
/// ```
/// use dosescan_stats::quartiles::Quartiles;
///
/// let quartiles = Quartiles::from_sorted(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
/// assert_eq!(quartiles.q1, 2.0);
/// assert_eq!(quartiles.median, 3.0);
/// assert_eq!(quartiles.q3, 4.0);
/// assert_eq!(quartiles.iqr(), 2.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quartiles {
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
}

impl Quartiles {
    /// Computes quartiles from sorted values.
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

        let n = sorted_values.len();
        let median = median_of_sorted(sorted_values).ok_or(StatsError::InvalidInput)?;
        let (lower, upper) = if n % 2 == 1 {
            (&sorted_values[..=n / 2], &sorted_values[n / 2..])
        } else {
            (&sorted_values[..n / 2], &sorted_values[n / 2..])
        };
        let q1 = median_of_sorted(lower).ok_or(StatsError::InvalidInput)?;
        let q3 = median_of_sorted(upper).ok_or(StatsError::InvalidInput)?;
        Ok(Self { q1, median, q3 })
    }

    /// Interquartile range, `Q3 - Q1`.
    #[must_use]
    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }

    /// Fences at `multiplier` interquartile ranges beyond Q1 and Q3.
    #[must_use]
    pub fn fences(&self, multiplier: f64) -> Fences {
        let margin = self.iqr() * multiplier;
        Fences {
            lower: self.q1 - margin,
            upper: self.q3 + margin,
        }
    }

    /// The 1.5×IQR fence separating regular values from outliers.
    #[must_use]
    pub fn outlier_fences(&self) -> Fences {
        self.fences(OUTLIER_IQR_MULTIPLIER)
    }

    /// The 2.0×IQR fence beyond which values are far-out.
    #[must_use]
    pub fn far_out_fences(&self) -> Fences {
        self.fences(FAR_OUT_IQR_MULTIPLIER)
    }
}

/// A closed interval `[lower, upper]`; values strictly outside it lie beyond the fence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fences {
    pub lower: f64,
    pub upper: f64,
}

impl Fences {
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        (self.lower..=self.upper).contains(&value)
    }

    #[must_use]
    pub fn is_below(&self, value: f64) -> bool {
        value < self.lower
    }

    #[must_use]
    pub fn is_above(&self, value: f64) -> bool {
        value > self.upper
    }
}
