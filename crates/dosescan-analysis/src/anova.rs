//! One-way ANOVA prefilter
//!
//! Flags features whose replicate values vary with dose more than within dose
//! groups. Each feature gets a classical one-way F test across its dose
//! groups, then the p-values of the whole feature set are adjusted with the
//! selected [`CorrectionMethod`].
//!
//! # Undefined statistics
//!
//! The design check ([`AnalysisError::InsufficientGroups`],
//! [`AnalysisError::InsufficientReplicates`]) fails the whole run. A feature
//! that passes the design check but loses too many replicates to missing
//! values to leave two groups and one within-group degree of freedom gets an
//! absent F statistic and a p-value of 1; it never aborts the run.
//!
//! When all within-group variance is zero, F is `+inf` with p-value 0 if the
//! group means differ, and 0 with p-value 1 if they do not.

use std::sync::Arc;

use dosescan_stats::descriptive;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF as _, FisherSnedecor};
use tracing::{debug, info};

use crate::{
    AnalysisError, annotation::GeneAnnotations, correction::CorrectionMethod,
    fold_change::FoldChanges, measurement::DoseResponseDataset, row::FeatureRow,
    task::{self, RunControl, TaskHandle},
};

/// ANOVA prefilter settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnovaConfig {
    pub correction: CorrectionMethod,
}

/// One-way ANOVA outcome for a single feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnovaResult {
    #[serde(flatten)]
    pub row: FeatureRow,
    /// Between-groups degrees of freedom, `k - 1`.
    pub df_between: u16,
    /// Within-groups degrees of freedom, `N - k`.
    pub df_within: u16,
    /// F statistic; absent when undefined for this feature.
    #[serde(with = "crate::serde_float::option")]
    pub f_value: Option<f64>,
    pub p_value: f64,
    pub adjusted_p_value: f64,
    pub best_fold_change: Option<f64>,
    pub fold_changes: Vec<Option<f64>>,
}

impl AnovaResult {
    #[must_use]
    pub fn feature_id(&self) -> &str {
        &self.row.feature_id
    }

    #[must_use]
    pub fn neg_log10_p_value(&self) -> f64 {
        -self.p_value.log10()
    }

    #[must_use]
    pub fn neg_log10_adjusted_p_value(&self) -> f64 {
        -self.adjusted_p_value.log10()
    }

    #[must_use]
    pub fn best_fold_change_abs(&self) -> Option<f64> {
        self.best_fold_change.map(f64::abs)
    }
}

/// ANOVA results for a whole feature set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnovaResults {
    pub dataset: String,
    pub config: AnovaConfig,
    pub results: Vec<AnovaResult>,
}

impl AnovaResults {
    /// Results whose p-value (adjusted when `use_adjusted`) is at or below `cutoff`.
    pub fn passing(&self, cutoff: f64, use_adjusted: bool) -> impl Iterator<Item = &AnovaResult> {
        self.results.iter().filter(move |r| {
            let p = if use_adjusted {
                r.adjusted_p_value
            } else {
                r.p_value
            };
            p <= cutoff
        })
    }

    /// Decorates every row with gene annotations.
    #[must_use]
    pub fn annotated(self, annotations: &GeneAnnotations) -> Self {
        Self {
            results: self
                .results
                .into_iter()
                .map(|r| AnovaResult {
                    row: r.row.annotated(annotations),
                    ..r
                })
                .collect(),
            ..self
        }
    }
}

/// Classical one-way ANOVA decomposition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OneWayAnova {
    pub df_between: usize,
    pub df_within: usize,
    pub f_value: Option<f64>,
    pub p_value: f64,
}

impl OneWayAnova {
    /// Runs the F test over groups of finite values. Empty groups are ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use dosescan_analysis::anova::OneWayAnova;
    ///
    /// let anova = OneWayAnova::compute(&[vec![1.0, 2.0, 3.0], vec![1.0, 2.0, 3.0]]);
    /// assert_eq!(anova.f_value, Some(0.0));
    /// assert_eq!(anova.p_value, 1.0);
    /// assert_eq!((anova.df_between, anova.df_within), (1, 4));
    /// ```
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn compute(groups: &[Vec<f64>]) -> Self {
        let groups = groups.iter().filter(|g| !g.is_empty()).collect::<Vec<_>>();
        let k = groups.len();
        let n = groups.iter().map(|g| g.len()).sum::<usize>();
        let df_between = k.saturating_sub(1);
        let df_within = n.saturating_sub(k);
        let undefined = Self {
            df_between,
            df_within,
            f_value: None,
            p_value: 1.0,
        };
        if df_between == 0 || df_within == 0 {
            return undefined;
        }

        let grand_mean = groups.iter().flat_map(|g| g.iter()).sum::<f64>() / n as f64;
        let (ss_between, ss_within) =
            groups
                .iter()
                .fold((0.0, 0.0), |(between, within), group| {
                    let mean = descriptive::mean(group).unwrap_or(grand_mean);
                    (
                        between + group.len() as f64 * (mean - grand_mean).powi(2),
                        within + descriptive::sum_of_squares(group, mean),
                    )
                });
        let ms_between = ss_between / df_between as f64;
        let ms_within = ss_within / df_within as f64;

        let (f_value, p_value) = if ms_within > 0.0 {
            let f = ms_between / ms_within;
            let p = FisherSnedecor::new(df_between as f64, df_within as f64)
                .map_or(1.0, |dist| dist.sf(f));
            (f, p.clamp(0.0, 1.0))
        } else if ms_between > 0.0 {
            (f64::INFINITY, 0.0)
        } else {
            (0.0, 1.0)
        };
        if f_value.is_nan() {
            return undefined;
        }

        Self {
            df_between,
            df_within,
            f_value: Some(f_value),
            p_value,
        }
    }
}

/// Runs the ANOVA prefilter over every feature of `dataset`.
///
/// Progress is reported once per feature; cancellation is checked before each
/// feature.
///
/// # Errors
///
/// - [`AnalysisError::InsufficientGroups`] / [`AnalysisError::InsufficientReplicates`]
///   if any feature fails the design check.
/// - [`AnalysisError::Cancelled`] if `control` requests cancellation.
pub fn prefilter_anova(
    dataset: &DoseResponseDataset,
    config: &AnovaConfig,
    control: &dyn RunControl,
) -> Result<AnovaResults, AnalysisError> {
    let features = &dataset.features;
    info!(
        dataset = %dataset.name,
        features = features.len(),
        correction = ?config.correction,
        "anova_started"
    );
    dataset.check_design()?;

    let mut results = Vec::with_capacity(features.len());
    for (i, feature) in features.iter().enumerate() {
        if control.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }
        let anova = OneWayAnova::compute(&feature.valid_groups());
        if anova.f_value.is_none() {
            debug!(feature = %feature.id, "anova_undefined");
        }
        let fold_changes = FoldChanges::from_feature(feature);
        results.push(AnovaResult {
            row: FeatureRow::new(feature.id.clone()),
            df_between: saturating_u16(anova.df_between),
            df_within: saturating_u16(anova.df_within),
            f_value: anova.f_value,
            p_value: anova.p_value,
            adjusted_p_value: anova.p_value,
            best_fold_change: fold_changes.best,
            fold_changes: fold_changes.per_group,
        });
        control.report_progress(progress_fraction(i + 1, features.len()));
    }

    let entries = results
        .iter()
        .map(|r| (r.row.feature_id.as_str(), r.p_value))
        .collect::<Vec<_>>();
    let adjusted = config.correction.adjust(&entries);
    for (result, q) in results.iter_mut().zip(adjusted) {
        result.adjusted_p_value = q;
    }

    info!(dataset = %dataset.name, features = results.len(), "anova_finished");
    Ok(AnovaResults {
        dataset: dataset.name.clone(),
        config: *config,
        results,
    })
}

/// Runs [`prefilter_anova`] on a background worker.
///
/// # Errors
///
/// Returns [`AnalysisError::Spawn`] if the worker cannot be started.
pub fn spawn_anova(
    dataset: Arc<DoseResponseDataset>,
    config: AnovaConfig,
) -> Result<TaskHandle<AnovaResults>, AnalysisError> {
    let label = dataset.name.clone();
    task::spawn_task("anova", label, move |control| {
        prefilter_anova(&dataset, &config, control)
    })
}

fn saturating_u16(value: usize) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

#[expect(clippy::cast_precision_loss)]
pub(crate) fn progress_fraction(done: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        done as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        measurement::{DoseGroup, FeatureMeasurement},
        task::Unattended,
    };

    fn feature(id: &str, groups: &[&[f64]]) -> FeatureMeasurement {
        let groups = groups
            .iter()
            .zip(0_i32..)
            .map(|(values, dose)| DoseGroup::new(f64::from(dose), values.to_vec()))
            .collect();
        FeatureMeasurement::new(id, groups)
    }

    fn run(features: &[FeatureMeasurement]) -> Result<AnovaResults, AnalysisError> {
        let dataset = DoseResponseDataset::new("test", features.to_vec());
        prefilter_anova(&dataset, &AnovaConfig::default(), &Unattended)
    }

    mod statistic {
        use super::*;

        #[test]
        fn test_known_f_value() {
            // Group means 2, 4, 6; SSB = 24, SSW = 6; F = (24 / 2) / (6 / 6) = 12
            let anova = OneWayAnova::compute(&[
                vec![1.0, 2.0, 3.0],
                vec![3.0, 4.0, 5.0],
                vec![5.0, 6.0, 7.0],
            ]);
            assert_eq!((anova.df_between, anova.df_within), (2, 6));
            assert!((anova.f_value.unwrap() - 12.0).abs() < 1e-12);
            // Upper tail of F(2, 6) at 12 is (1 + 12 * 2 / 6)^-3 = 5^-3
            assert!((anova.p_value - 0.008).abs() < 1e-9);
        }

        #[test]
        fn test_identical_groups_give_zero_f() {
            let anova = OneWayAnova::compute(&[vec![1.0, 2.0, 3.0], vec![3.0, 1.0, 2.0]]);
            assert!(anova.f_value.unwrap().abs() < 1e-12);
            assert!((anova.p_value - 1.0).abs() < 1e-9);
        }

        #[test]
        fn test_zero_within_variance() {
            let anova = OneWayAnova::compute(&[vec![5.0, 5.0], vec![6.0, 6.0]]);
            assert_eq!(anova.f_value, Some(f64::INFINITY));
            assert_eq!(anova.p_value, 0.0);

            let flat = OneWayAnova::compute(&[vec![5.0, 5.0], vec![5.0, 5.0]]);
            assert_eq!(flat.f_value, Some(0.0));
            assert_eq!(flat.p_value, 1.0);
        }

        #[test]
        fn test_single_replicate_groups_contribute_no_variance() {
            let anova = OneWayAnova::compute(&[vec![1.0, 3.0], vec![10.0]]);
            assert_eq!((anova.df_between, anova.df_within), (1, 1));
            assert!(anova.f_value.unwrap() > 0.0);
        }

        #[test]
        fn test_undefined_without_within_freedom() {
            let anova = OneWayAnova::compute(&[vec![1.0], vec![2.0], vec![]]);
            assert_eq!(anova.f_value, None);
            assert_eq!(anova.p_value, 1.0);
        }
    }

    #[test]
    fn test_dose_response_example() {
        let results = run(&[feature("up", &[&[5.0, 5.0, 5.0], &[6.0, 6.0, 6.0], &[20.0, 20.0, 20.0]])])
            .unwrap();
        let result = &results.results[0];
        assert_eq!(result.f_value, Some(f64::INFINITY));
        assert_eq!(result.p_value, 0.0);
        assert_eq!(result.best_fold_change, Some(2.0));
        assert_eq!(result.best_fold_change_abs(), Some(2.0));
        assert_eq!(result.fold_changes.len(), 2);
    }

    #[test]
    fn test_neg_log10_p_values() {
        let results = run(&[
            feature("exact", &[&[5.0, 5.0], &[6.0, 6.0]]),
            feature("noisy", &[&[1.0, 2.0, 3.0], &[3.0, 4.0, 5.0], &[5.0, 6.0, 7.0]]),
        ])
        .unwrap();
        let exact = &results.results[0];
        assert_eq!(exact.p_value, 0.0);
        assert_eq!(exact.neg_log10_p_value(), f64::INFINITY);
        assert_eq!(exact.neg_log10_adjusted_p_value(), f64::INFINITY);

        let noisy = &results.results[1];
        assert!((noisy.neg_log10_p_value() - -(0.008f64.log10())).abs() < 1e-6);
        assert!(noisy.adjusted_p_value >= noisy.p_value);
        assert!(noisy.neg_log10_adjusted_p_value() <= noisy.neg_log10_p_value());
    }

    #[test]
    fn test_overflowing_fold_change_roundtrips_as_absent() {
        let results = run(&[feature("extreme", &[&[1e-320, 1.1e-320], &[1e10, 1.1e10]])]).unwrap();
        let result = &results.results[0];
        assert_eq!(result.best_fold_change, None);
        assert_eq!(result.fold_changes, vec![None]);

        let json = serde_json::to_string(&results).unwrap();
        let restored: AnovaResults = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, results);
    }

    #[test]
    fn test_design_errors_fail_the_run() {
        let err = run(&[feature("one_group", &[&[1.0, 2.0]])]).unwrap_err();
        assert!(err.is_insufficient_groups());

        let err = run(&[feature("unreplicated", &[&[1.0], &[2.0], &[3.0]])]).unwrap_err();
        assert!(err.is_insufficient_replicates());
    }

    #[test]
    fn test_missing_values_make_feature_undefined_not_fatal() {
        let results = run(&[
            feature("sparse", &[&[1.0, f64::NAN], &[2.0, f64::NAN]]),
            feature("dense", &[&[1.0, 1.1], &[2.0, 2.1]]),
        ])
        .unwrap();
        assert_eq!(results.results[0].f_value, None);
        assert_eq!(results.results[0].p_value, 1.0);
        assert!(results.results[1].f_value.is_some());
    }

    #[test]
    fn test_adjusted_p_values_follow_raw_rank_order() {
        let features = [
            feature("a", &[&[1.0, 1.2, 0.9], &[1.1, 1.0, 1.3]]),
            feature("b", &[&[1.0, 1.2, 0.9], &[3.0, 3.2, 2.9]]),
            feature("c", &[&[1.0, 1.2, 0.9], &[1.6, 1.9, 1.5]]),
            feature("d", &[&[1.0, 2.2, 0.1], &[1.6, 0.9, 2.5]]),
        ];
        let results = run(&features).unwrap();
        let mut pairs = results
            .results
            .iter()
            .map(|r| (r.p_value, r.adjusted_p_value))
            .collect::<Vec<_>>();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        assert!(pairs.windows(2).all(|w| w[0].1 <= w[1].1));
        assert_eq!(results.passing(0.05, true).next().unwrap().feature_id(), "b");
    }

    #[test]
    fn test_background_run() {
        let dataset = Arc::new(DoseResponseDataset::new(
            "bg",
            vec![feature("p1", &[&[5.0, 5.5], &[10.0, 10.5]])],
        ));
        let handle = spawn_anova(dataset, AnovaConfig::default()).unwrap();
        let mut progress = vec![];
        let outcome = handle.wait(|p| progress.push(p));
        assert_eq!(progress, vec![1.0]);
        let results = outcome.completed().unwrap();
        assert_eq!(results.dataset, "bg");
        assert_eq!(results.results.len(), 1);
    }

    #[test]
    fn test_annotation_and_roundtrip() {
        let results = run(&[feature("p1", &[&[5.0, 5.0], &[10.0, 10.0]])]).unwrap();
        let annotations = [(
            "p1".to_owned(),
            vec![crate::annotation::ReferenceGene {
                id: "1".to_owned(),
                symbol: "A1BG".to_owned(),
            }],
        )]
        .into_iter()
        .collect();
        let results = results.annotated(&annotations);
        assert_eq!(results.results[0].row.gene_symbols.as_deref(), Some("A1BG"));

        let json = serde_json::to_string(&results).unwrap();
        let restored: AnovaResults = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, results);
    }
}
