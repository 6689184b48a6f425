use dosescan_stats::descriptive;
use serde::{Deserialize, Serialize};

use crate::measurement::FeatureMeasurement;

/// Signed log2 fold changes of each treated dose group against the control.
///
/// A fold change is `log2(mean_group / mean_control)`; it is absent for a
/// group when either mean is missing or not strictly positive, or when the
/// ratio overflows or underflows to a non-finite logarithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldChanges {
    /// One entry per non-control dose group, in dose order.
    pub per_group: Vec<Option<f64>>,
    /// The defined fold change of largest magnitude, sign kept.
    pub best: Option<f64>,
}

impl FoldChanges {
    /// # Examples
    ///
    /// ```
    /// use dosescan_analysis::{
    ///     fold_change::FoldChanges,
    ///     measurement::{DoseGroup, FeatureMeasurement},
    /// };
    ///
    /// let feature = FeatureMeasurement::new(
    ///     "probe",
    ///     vec![
    ///         DoseGroup::new(0.0, vec![4.0, 4.0]),
    ///         DoseGroup::new(1.0, vec![8.0, 8.0]),
    ///         DoseGroup::new(2.0, vec![1.0, 1.0]),
    ///     ],
    /// );
    /// let fold_changes = FoldChanges::from_feature(&feature);
    /// assert_eq!(fold_changes.per_group, vec![Some(1.0), Some(-2.0)]);
    /// assert_eq!(fold_changes.best, Some(-2.0));
    /// ```
    #[must_use]
    pub fn from_feature(feature: &FeatureMeasurement) -> Self {
        let means = feature
            .groups()
            .iter()
            .map(|g| descriptive::mean(&g.valid_values().collect::<Vec<_>>()))
            .collect::<Vec<_>>();
        let control_mean = means.first().copied().flatten();

        let per_group = means
            .iter()
            .skip(1)
            .map(|&mean| log2_ratio(mean?, control_mean?))
            .collect::<Vec<_>>();
        let best = per_group
            .iter()
            .flatten()
            .copied()
            .reduce(|best, fc| if fc.abs() > best.abs() { fc } else { best });

        Self { per_group, best }
    }
}

fn log2_ratio(numerator: f64, denominator: f64) -> Option<f64> {
    (numerator > 0.0 && denominator > 0.0)
        .then(|| (numerator / denominator).log2())
        .filter(|fc| fc.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::DoseGroup;

    fn feature(groups: &[&[f64]]) -> FeatureMeasurement {
        let groups = groups
            .iter()
            .zip(0_i32..)
            .map(|(values, dose)| DoseGroup::new(f64::from(dose), values.to_vec()))
            .collect();
        FeatureMeasurement::new("f", groups)
    }

    #[test]
    fn test_increasing_response() {
        let fc = FoldChanges::from_feature(&feature(&[&[5.0, 5.0, 5.0], &[6.0, 6.0, 6.0], &[20.0, 20.0, 20.0]]));
        assert_eq!(fc.best, Some(2.0));
        assert!((fc.per_group[0].unwrap() - (6.0f64 / 5.0).log2()).abs() < 1e-12);
    }

    #[test]
    fn test_non_positive_means_are_undefined() {
        let fc = FoldChanges::from_feature(&feature(&[&[2.0], &[-1.0], &[f64::NAN], &[4.0]]));
        assert_eq!(fc.per_group, vec![None, None, Some(1.0)]);
        assert_eq!(fc.best, Some(1.0));
    }

    #[test]
    fn test_missing_control_leaves_everything_undefined() {
        let fc = FoldChanges::from_feature(&feature(&[&[f64::NAN], &[1.0], &[2.0]]));
        assert_eq!(fc.per_group, vec![None, None]);
        assert_eq!(fc.best, None);
    }

    #[test]
    fn test_overflowing_ratio_is_undefined() {
        let fc = FoldChanges::from_feature(&feature(&[
            &[1e-320, 1.1e-320],
            &[1e10, 1.1e10],
            &[1e-320, 1e-320],
        ]));
        assert_eq!(fc.per_group[0], None);
        assert!(fc.per_group[1].is_some_and(f64::is_finite));
        assert!(fc.best.is_some_and(f64::is_finite));

        let fc = FoldChanges::from_feature(&feature(&[&[1e300], &[1e-300]]));
        assert_eq!(fc.per_group, vec![None]);
        assert_eq!(fc.best, None);
    }

    #[test]
    fn test_ties_keep_lowest_dose() {
        let fc = FoldChanges::from_feature(&feature(&[&[4.0], &[8.0], &[2.0]]));
        assert_eq!(fc.best, Some(1.0));
    }
}
