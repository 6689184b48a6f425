//! Dose-response measurement data
//!
//! A [`FeatureMeasurement`] holds the replicate values of one measured feature
//! (probe) grouped by dose. Groups are always kept in ascending dose order and
//! the lowest dose group is the control. Missing replicates are stored as NaN
//! and skipped by every statistic; they are never coerced to zero.
//!
//! # Example
//!
//! ```
//! use dosescan_analysis::measurement::FeatureMeasurement;
//!
//! // One value per sample column, with the dose of each column.
//! let doses = [0.0, 0.0, 10.0, 10.0, 1.0, 1.0];
//! let values = [5.0, 5.2, 9.8, 10.1, 6.0, f64::NAN];
//! let feature = FeatureMeasurement::from_columns("probe_1", &doses, &values).unwrap();
//!
//! assert_eq!(feature.groups().len(), 3);
//! assert_eq!(feature.control().unwrap().dose, 0.0);
//! assert_eq!(feature.groups()[1].valid_values().collect::<Vec<_>>(), vec![6.0]);
//! ```

use serde::{Deserialize, Serialize};

use crate::AnalysisError;

/// Replicate values measured at one dose level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoseGroup {
    pub dose: f64,
    /// Replicate values; NaN marks a missing replicate (`null` in JSON).
    #[serde(with = "crate::serde_float::missing")]
    pub values: Vec<f64>,
}

impl DoseGroup {
    #[must_use]
    pub fn new(dose: f64, values: Vec<f64>) -> Self {
        Self { dose, values }
    }

    /// Replicate values with missing (NaN) entries skipped.
    pub fn valid_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied().filter(|v| !v.is_nan())
    }
}

/// Replicate measurements of one feature across ordered dose groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "FeatureMeasurementRepr")]
pub struct FeatureMeasurement {
    pub id: String,
    groups: Vec<DoseGroup>,
}

#[derive(Deserialize)]
struct FeatureMeasurementRepr {
    id: String,
    groups: Vec<DoseGroup>,
}

impl From<FeatureMeasurementRepr> for FeatureMeasurement {
    fn from(repr: FeatureMeasurementRepr) -> Self {
        Self::new(repr.id, repr.groups)
    }
}

impl FeatureMeasurement {
    /// Creates a measurement, ordering the groups by ascending dose.
    ///
    /// Groups with equal doses are merged into one, their replicates
    /// concatenated in the order the groups were given.
    #[must_use]
    pub fn new(id: impl Into<String>, mut groups: Vec<DoseGroup>) -> Self {
        groups.sort_by(|a, b| a.dose.total_cmp(&b.dose));
        let mut merged: Vec<DoseGroup> = Vec::with_capacity(groups.len());
        for group in groups {
            match merged.last_mut() {
                Some(last) if last.dose.total_cmp(&group.dose).is_eq() => {
                    last.values.extend(group.values);
                }
                _ => merged.push(group),
            }
        }
        Self {
            id: id.into(),
            groups: merged,
        }
    }

    /// Builds a measurement from per-sample columns, grouping columns that
    /// share a dose.
    ///
    /// # Errors
    ///
    /// - [`AnalysisError::ShapeMismatch`] if `doses` and `values` differ in length.
    /// - [`AnalysisError::InvalidDose`] if a dose is not a finite number.
    pub fn from_columns(
        id: impl Into<String>,
        doses: &[f64],
        values: &[f64],
    ) -> Result<Self, AnalysisError> {
        if doses.len() != values.len() {
            return Err(AnalysisError::ShapeMismatch {
                expected: doses.len(),
                actual: values.len(),
            });
        }
        if let Some(&value) = doses.iter().find(|d| !d.is_finite()) {
            return Err(AnalysisError::InvalidDose { value });
        }

        let groups = doses
            .iter()
            .zip(values)
            .map(|(&dose, &value)| DoseGroup::new(dose, vec![value]))
            .collect();
        Ok(Self::new(id, groups))
    }

    /// Dose groups in ascending dose order.
    #[must_use]
    pub fn groups(&self) -> &[DoseGroup] {
        &self.groups
    }

    /// The lowest-dose group.
    #[must_use]
    pub fn control(&self) -> Option<&DoseGroup> {
        self.groups.first()
    }

    /// Checks the group layout every prefilter needs: at least two dose groups,
    /// and at least one group with more than one replicate slot.
    pub(crate) fn check_design(&self) -> Result<(), AnalysisError> {
        if self.groups.len() < 2 {
            return Err(AnalysisError::InsufficientGroups {
                feature_id: self.id.clone(),
            });
        }
        if self.groups.iter().all(|g| g.values.len() <= 1) {
            return Err(AnalysisError::InsufficientReplicates {
                feature_id: self.id.clone(),
            });
        }
        Ok(())
    }

    /// Non-missing replicates per group, dropping groups left empty.
    ///
    /// The control group is kept in front even when empty so callers can
    /// detect a missing control.
    pub(crate) fn valid_groups(&self) -> Vec<Vec<f64>> {
        self.groups
            .iter()
            .enumerate()
            .map(|(i, g)| (i, g.valid_values().collect::<Vec<_>>()))
            .filter(|(i, values)| *i == 0 || !values.is_empty())
            .map(|(_, values)| values)
            .collect()
    }
}

/// A named panel of features measured over the same dose design.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoseResponseDataset {
    pub name: String,
    pub features: Vec<FeatureMeasurement>,
}

impl DoseResponseDataset {
    #[must_use]
    pub fn new(name: impl Into<String>, features: Vec<FeatureMeasurement>) -> Self {
        Self {
            name: name.into(),
            features,
        }
    }

    /// Runs the design check on every feature, failing on the first violation.
    pub(crate) fn check_design(&self) -> Result<(), AnalysisError> {
        self.features
            .iter()
            .try_for_each(FeatureMeasurement::check_design)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_orders_groups_by_dose() {
        let feature = FeatureMeasurement::new(
            "f",
            vec![
                DoseGroup::new(10.0, vec![3.0]),
                DoseGroup::new(0.0, vec![1.0]),
                DoseGroup::new(1.0, vec![2.0]),
            ],
        );
        let doses = feature.groups().iter().map(|g| g.dose).collect::<Vec<_>>();
        assert_eq!(doses, vec![0.0, 1.0, 10.0]);
    }

    #[test]
    fn test_deserialize_reorders_groups() {
        let json = r#"{"id":"f","groups":[{"dose":5.0,"values":[2.0]},{"dose":0.0,"values":[1.0,null]}]}"#;
        let feature: FeatureMeasurement = serde_json::from_str(json).unwrap();
        let control = feature.control().unwrap();
        assert_eq!(control.dose, 0.0);
        assert_eq!(control.valid_values().collect::<Vec<_>>(), vec![1.0]);
    }

    #[test]
    fn test_equal_doses_are_merged() {
        let feature = FeatureMeasurement::new(
            "f",
            vec![
                DoseGroup::new(1.0, vec![2.0]),
                DoseGroup::new(0.0, vec![1.0]),
                DoseGroup::new(1.0, vec![2.5, f64::NAN]),
            ],
        );
        assert_eq!(feature.groups().len(), 2);
        let treated = &feature.groups()[1];
        assert_eq!(treated.dose, 1.0);
        assert_eq!(treated.valid_values().collect::<Vec<_>>(), vec![2.0, 2.5]);
        assert_eq!(treated.values.len(), 3);
    }

    #[test]
    fn test_deserialize_merges_equal_doses() {
        let json = r#"{"id":"f","groups":[{"dose":0.0,"values":[1.0]},{"dose":3.0,"values":[4.0]},{"dose":0.0,"values":[1.5]}]}"#;
        let feature: FeatureMeasurement = serde_json::from_str(json).unwrap();
        assert_eq!(feature.groups().len(), 2);
        assert_eq!(feature.control().unwrap().values, vec![1.0, 1.5]);
        feature.check_design().unwrap();
    }

    #[test]
    fn test_from_columns_rejects_mismatched_lengths() {
        let err = FeatureMeasurement::from_columns("f", &[0.0, 1.0], &[1.0]).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::ShapeMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_from_columns_rejects_nan_dose() {
        let err = FeatureMeasurement::from_columns("f", &[0.0, f64::NAN], &[1.0, 2.0]).unwrap_err();
        assert!(err.is_invalid_dose());
    }

    #[test]
    fn test_design_checks() {
        let single = FeatureMeasurement::new("a", vec![DoseGroup::new(0.0, vec![1.0, 2.0])]);
        assert!(single.check_design().unwrap_err().is_insufficient_groups());

        let unreplicated = FeatureMeasurement::new(
            "b",
            vec![DoseGroup::new(0.0, vec![1.0]), DoseGroup::new(1.0, vec![2.0])],
        );
        assert!(
            unreplicated
                .check_design()
                .unwrap_err()
                .is_insufficient_replicates()
        );
    }

    #[test]
    fn test_valid_groups_drop_empty_treatment_groups() {
        let feature = FeatureMeasurement::new(
            "f",
            vec![
                DoseGroup::new(0.0, vec![1.0, f64::NAN]),
                DoseGroup::new(1.0, vec![f64::NAN]),
                DoseGroup::new(2.0, vec![3.0, 4.0]),
            ],
        );
        assert_eq!(feature.valid_groups(), vec![vec![1.0], vec![3.0, 4.0]]);
    }
}
