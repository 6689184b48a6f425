//! Williams trend test with permutation p-values
//!
//! For every feature, a Williams-type statistic measures the strongest
//! monotone (increasing or decreasing) departure of the highest dose group
//! from the control. Significance is calibrated empirically: replicate values
//! are reshuffled across dose groups, keeping group sizes, and the statistic
//! is recomputed for each permutation.
//!
//! After testing, features may be excluded as control probes or for a small
//! fold change, and the surviving features are multiplicity-corrected
//! together.

use std::{fmt, num::NonZeroUsize, str::FromStr, sync::Arc};

use dosescan_stats::descriptive;
use rand::{
    Rng, SeedableRng as _,
    distr::{Distribution, StandardUniform},
    seq::SliceRandom as _,
};
use rand_pcg::Pcg32;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info};

use crate::{
    AnalysisError,
    anova::progress_fraction,
    annotation::GeneAnnotations,
    correction::CorrectionMethod,
    fold_change::FoldChanges,
    measurement::{DoseResponseDataset, FeatureMeasurement},
    row::FeatureRow,
    task::{self, RunControl, TaskHandle, TaskOutcome},
};

/// Id prefix of vendor control probes.
pub const DEFAULT_CONTROL_PREFIX: &str = "AFFX";

/// Permutation count used when none is given.
pub const DEFAULT_PERMUTATIONS: NonZeroUsize = NonZeroUsize::new(1000).unwrap();

/// Permuted statistics within this distance of the observed one count as ties.
const TIE_TOLERANCE: f64 = 1e-12;

/// Seed of the permutation generator.
///
/// A 128-bit seed written as 32 hex digits. Running the same dataset with the
/// same seed and permutation count reproduces every p-value.
///
/// # Example
///
/// ```
/// use dosescan_analysis::trend::PermutationSeed;
/// use rand::Rng as _;
///
/// let seed: PermutationSeed = rand::rng().random();
/// let parsed: PermutationSeed = seed.to_string().parse()?;
/// assert_eq!(parsed, seed);
/// # Ok::<(), dosescan_analysis::AnalysisError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PermutationSeed([u8; 16]);

impl PermutationSeed {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    fn rng(self) -> Pcg32 {
        Pcg32::from_seed(self.0)
    }
}

impl fmt::Display for PermutationSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", u128::from_be_bytes(self.0))
    }
}

impl FromStr for PermutationSeed {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AnalysisError::InvalidConfig {
            name: "permutation seed",
            value: s.to_owned(),
        };
        if s.len() != 32 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let num = u128::from_str_radix(s, 16).map_err(|_| invalid())?;
        Ok(Self(num.to_be_bytes()))
    }
}

impl Serialize for PermutationSeed {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PermutationSeed {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let hex = String::deserialize(deserializer)?;
        hex.parse().map_err(serde::de::Error::custom)
    }
}

impl Distribution<PermutationSeed> for StandardUniform {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> PermutationSeed {
        let mut seed = [0; 16];
        rng.fill(&mut seed);
        PermutationSeed(seed)
    }
}

/// Trend test settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendTestConfig {
    /// Features at or below this (adjusted) p-value are selected.
    pub p_cutoff: f64,
    /// Correction applied over features surviving the filters; `None` keeps
    /// raw p-values.
    pub correction: Option<CorrectionMethod>,
    pub filter_controls: bool,
    pub control_prefixes: Vec<String>,
    /// Minimum linear fold change; `None` disables the fold filter.
    pub fold_filter: Option<f64>,
    pub permutations: NonZeroUsize,
    /// Fixed generator seed; a random one is drawn per run when `None`.
    pub seed: Option<PermutationSeed>,
}

impl Default for TrendTestConfig {
    fn default() -> Self {
        Self {
            p_cutoff: 0.05,
            correction: None,
            filter_controls: false,
            control_prefixes: vec![DEFAULT_CONTROL_PREFIX.to_owned()],
            fold_filter: None,
            permutations: DEFAULT_PERMUTATIONS,
            seed: None,
        }
    }
}

impl TrendTestConfig {
    /// Builds a configuration from the values a user types in.
    ///
    /// The fold threshold is only parsed when `use_fold_filter` is set.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::InvalidConfig`] when the cutoff is outside
    /// `(0, 1]`, the fold threshold is not a number `>= 1`, or the
    /// permutation count is not a positive integer.
    ///
    /// # Examples
    ///
    /// ```
    /// use dosescan_analysis::trend::TrendTestConfig;
    ///
    /// let config = TrendTestConfig::from_user_input(0.05, true, true, true, "1.5", "500")?;
    /// assert_eq!(config.fold_filter, Some(1.5));
    /// assert_eq!(config.permutations.get(), 500);
    ///
    /// assert!(TrendTestConfig::from_user_input(0.05, true, true, false, "", "0").is_err());
    /// # Ok::<(), dosescan_analysis::AnalysisError>(())
    /// ```
    pub fn from_user_input(
        p_cutoff: f64,
        apply_correction: bool,
        filter_controls: bool,
        use_fold_filter: bool,
        fold_filter_value: &str,
        permutations: &str,
    ) -> Result<Self, AnalysisError> {
        if !(p_cutoff > 0.0 && p_cutoff <= 1.0) {
            return Err(AnalysisError::InvalidConfig {
                name: "p-value cutoff",
                value: p_cutoff.to_string(),
            });
        }
        let fold_filter = if use_fold_filter {
            let threshold = fold_filter_value
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v >= 1.0)
                .ok_or_else(|| AnalysisError::InvalidConfig {
                    name: "fold change threshold",
                    value: fold_filter_value.to_owned(),
                })?;
            Some(threshold)
        } else {
            None
        };
        let permutations = permutations
            .trim()
            .parse::<NonZeroUsize>()
            .map_err(|_| AnalysisError::InvalidConfig {
                name: "permutation count",
                value: permutations.to_owned(),
            })?;

        Ok(Self {
            p_cutoff,
            correction: apply_correction.then(CorrectionMethod::default),
            filter_controls,
            fold_filter,
            permutations,
            ..Self::default()
        })
    }

    #[must_use]
    pub fn with_seed(self, seed: PermutationSeed) -> Self {
        Self {
            seed: Some(seed),
            ..self
        }
    }

    fn is_control_probe(&self, feature_id: &str) -> bool {
        self.filter_controls
            && self
                .control_prefixes
                .iter()
                .any(|prefix| feature_id.starts_with(prefix.as_str()))
    }

    fn fails_fold_filter(&self, best_fold_change: Option<f64>) -> bool {
        self.fold_filter.is_some_and(|threshold| {
            best_fold_change.is_none_or(|fc| fc.abs() < threshold.log2())
        })
    }
}

/// Trend test outcome for a single feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    #[serde(flatten)]
    pub row: FeatureRow,
    /// Observed statistic; absent when the feature has too few values.
    #[serde(with = "crate::serde_float::option")]
    pub statistic: Option<f64>,
    /// Empirical permutation p-value, a multiple of `1 / (permutations + 1)`.
    pub p_value: f64,
    /// Present only for features that survived the filters of a corrected run.
    pub adjusted_p_value: Option<f64>,
    pub best_fold_change: Option<f64>,
    pub excluded_as_control: bool,
    pub excluded_by_fold_change: bool,
}

impl TrendResult {
    #[must_use]
    pub fn feature_id(&self) -> &str {
        &self.row.feature_id
    }

    #[must_use]
    pub fn is_excluded(&self) -> bool {
        self.excluded_as_control || self.excluded_by_fold_change
    }

    #[must_use]
    pub fn neg_log10_p_value(&self) -> f64 {
        -self.p_value.log10()
    }
}

/// Trend test results for one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendResults {
    pub dataset: String,
    pub config: TrendTestConfig,
    /// Seed actually used, so the run can be reproduced.
    pub seed: PermutationSeed,
    pub results: Vec<TrendResult>,
}

impl TrendResults {
    /// Features that pass both filters and the p-value cutoff.
    ///
    /// The adjusted p-value is compared when the run was corrected.
    pub fn selected(&self) -> impl Iterator<Item = &TrendResult> {
        let corrected = self.config.correction.is_some();
        self.results.iter().filter(move |r| {
            let p = if corrected {
                r.adjusted_p_value
            } else {
                Some(r.p_value)
            };
            !r.is_excluded() && p.is_some_and(|p| p <= self.config.p_cutoff)
        })
    }

    /// Decorates every row with gene annotations.
    #[must_use]
    pub fn annotated(self, annotations: &GeneAnnotations) -> Self {
        Self {
            results: self
                .results
                .into_iter()
                .map(|r| TrendResult {
                    row: r.row.annotated(annotations),
                    ..r
                })
                .collect(),
            ..self
        }
    }
}

/// Williams-type trend statistic over dose-ordered groups.
///
/// `groups[0]` is the control. The highest-dose mean is re-estimated under an
/// increasing and under a decreasing order restriction over the treatment
/// groups, and the larger standardized departure from the control mean is
/// returned. The standard error uses the pooled within-group variance.
///
/// Returns `None` when any group is empty, there is no treatment group, or
/// there are no within-group degrees of freedom. With zero pooled variance
/// the statistic is `+inf` for a non-zero departure and 0 otherwise.
///
/// # Examples
///
/// ```
/// use dosescan_analysis::trend::williams_statistic;
///
/// let up = williams_statistic(&[[1.0, 2.0], [2.0, 3.0], [4.0, 5.0]]).unwrap();
/// let down = williams_statistic(&[[4.0, 5.0], [2.0, 3.0], [1.0, 2.0]]).unwrap();
/// assert!(up > 0.0);
/// assert!((up - down).abs() < 1e-12);
/// ```
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn williams_statistic<G>(groups: &[G]) -> Option<f64>
where
    G: AsRef<[f64]>,
{
    let (control, treatments) = groups.split_first()?;
    let control = control.as_ref();
    let last = treatments.last()?.as_ref();
    if control.is_empty() || treatments.iter().any(|g| g.as_ref().is_empty()) {
        return None;
    }

    let total = groups.iter().map(|g| g.as_ref().len()).sum::<usize>();
    let df = total.checked_sub(groups.len()).filter(|&df| df > 0)?;

    let mut within = 0.0;
    let mut treatment_means = Vec::with_capacity(treatments.len());
    for group in treatments {
        let group = group.as_ref();
        let mean = descriptive::mean(group)?;
        within += descriptive::sum_of_squares(group, mean);
        treatment_means.push((mean, group.len() as f64));
    }
    let control_mean = descriptive::mean(control)?;
    within += descriptive::sum_of_squares(control, control_mean);
    let pooled_variance = within / df as f64;

    let (increasing, decreasing) = restricted_last_means(&treatment_means);
    let departure = (increasing - control_mean).max(control_mean - decreasing);
    let se = (pooled_variance * (1.0 / last.len() as f64 + 1.0 / control.len() as f64)).sqrt();

    let statistic = if se > 0.0 {
        departure / se
    } else if departure > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };
    (!statistic.is_nan()).then_some(statistic)
}

/// Highest-dose value of the isotonic fit under an increasing and under a
/// decreasing order restriction, for `(mean, weight)` pairs in dose order.
///
/// The increasing fit at the last dose is the largest weighted mean of any
/// trailing run of groups; the decreasing fit is the smallest.
fn restricted_last_means(means: &[(f64, f64)]) -> (f64, f64) {
    let mut sum = 0.0;
    let mut weight = 0.0;
    let mut increasing = f64::NEG_INFINITY;
    let mut decreasing = f64::INFINITY;
    for &(mean, w) in means.iter().rev() {
        sum += mean * w;
        weight += w;
        let trailing = sum / weight;
        increasing = increasing.max(trailing);
        decreasing = decreasing.min(trailing);
    }
    (increasing, decreasing)
}

fn split_groups<'a>(values: &'a [f64], sizes: &[usize]) -> Vec<&'a [f64]> {
    let mut rest = values;
    sizes
        .iter()
        .map(|&size| {
            let (head, tail) = rest.split_at(size);
            rest = tail;
            head
        })
        .collect()
}

fn at_least(permuted: f64, observed: f64) -> bool {
    permuted >= observed
        || (observed.is_finite() && observed - permuted <= TIE_TOLERANCE * observed.abs().max(1.0))
}

/// Empirical p-value of `observed` over `permutations` reshuffles of the
/// replicate values across `groups`.
///
/// Cancellation is checked before every permutation.
#[expect(clippy::cast_precision_loss)]
fn permutation_p_value(
    groups: &[Vec<f64>],
    observed: f64,
    permutations: NonZeroUsize,
    rng: &mut Pcg32,
    control: &dyn RunControl,
) -> Result<f64, AnalysisError> {
    let sizes = groups.iter().map(Vec::len).collect::<Vec<_>>();
    let mut values = groups.concat();
    let mut exceeding = 0_usize;
    for _ in 0..permutations.get() {
        if control.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }
        values.shuffle(rng);
        let permuted = williams_statistic(&split_groups(&values, &sizes));
        if permuted.is_some_and(|s| at_least(s, observed)) {
            exceeding += 1;
        }
    }
    Ok((exceeding + 1) as f64 / (permutations.get() + 1) as f64)
}

fn test_feature(
    feature: &FeatureMeasurement,
    config: &TrendTestConfig,
    rng: &mut Pcg32,
    control: &dyn RunControl,
) -> Result<TrendResult, AnalysisError> {
    let groups = feature.valid_groups();
    let statistic = williams_statistic(&groups);
    let p_value = match statistic {
        Some(observed) => {
            permutation_p_value(&groups, observed, config.permutations, rng, control)?
        }
        None => {
            debug!(feature = %feature.id, "trend_statistic_undefined");
            1.0
        }
    };
    let best_fold_change = FoldChanges::from_feature(feature).best;

    Ok(TrendResult {
        row: FeatureRow::new(feature.id.clone()),
        statistic,
        p_value,
        adjusted_p_value: None,
        best_fold_change,
        excluded_as_control: config.is_control_probe(&feature.id),
        excluded_by_fold_change: config.fails_fold_filter(best_fold_change),
    })
}

/// Runs the trend test over every feature of `dataset`.
///
/// Features are tested in order with a single generator seeded from
/// `config.seed` (or a fresh random seed, recorded in the result). Progress
/// is reported once per feature.
///
/// # Errors
///
/// - [`AnalysisError::InsufficientGroups`] / [`AnalysisError::InsufficientReplicates`]
///   if any feature fails the design check.
/// - [`AnalysisError::Cancelled`] if `control` requests cancellation; no
///   partial results are returned.
pub fn run_trend_test(
    dataset: &DoseResponseDataset,
    config: &TrendTestConfig,
    control: &dyn RunControl,
) -> Result<TrendResults, AnalysisError> {
    dataset.check_design()?;
    let seed = config.seed.unwrap_or_else(|| rand::rng().random());
    let mut rng = seed.rng();
    let features = &dataset.features;
    info!(
        dataset = %dataset.name,
        features = features.len(),
        permutations = config.permutations.get(),
        %seed,
        "trend_test_started"
    );

    let mut results = Vec::with_capacity(features.len());
    for (i, feature) in features.iter().enumerate() {
        if control.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }
        results.push(test_feature(feature, config, &mut rng, control)?);
        control.report_progress(progress_fraction(i + 1, features.len()));
    }

    if let Some(correction) = config.correction {
        let surviving = results
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.is_excluded())
            .map(|(i, r)| (i, r.row.feature_id.as_str(), r.p_value))
            .collect::<Vec<_>>();
        let entries = surviving
            .iter()
            .map(|&(_, id, p)| (id, p))
            .collect::<Vec<_>>();
        let adjusted = correction.adjust(&entries);
        let indices = surviving.iter().map(|&(i, _, _)| i).collect::<Vec<_>>();
        for (i, q) in indices.into_iter().zip(adjusted) {
            results[i].adjusted_p_value = Some(q);
        }
    }

    let results = TrendResults {
        dataset: dataset.name.clone(),
        config: config.clone(),
        seed,
        results,
    };
    info!(
        dataset = %dataset.name,
        selected = results.selected().count(),
        "trend_test_finished"
    );
    Ok(results)
}

/// Background trend test runs over several datasets.
#[derive(Debug)]
pub struct TrendBatch {
    handles: Vec<TaskHandle<TrendResults>>,
}

impl TrendBatch {
    /// Cancels every run in the batch.
    pub fn cancel(&self) {
        for handle in &self.handles {
            handle.cancel();
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits for every run in turn, passing `(dataset, fraction)` progress
    /// reports to `on_progress`.
    pub fn wait_all(
        self,
        mut on_progress: impl FnMut(&str, f64),
    ) -> Vec<(String, TaskOutcome<TrendResults>)> {
        self.handles
            .into_iter()
            .map(|handle| {
                let label = handle.label().to_owned();
                let outcome = handle.wait(|fraction| on_progress(&label, fraction));
                (label, outcome)
            })
            .collect()
    }
}

/// Starts one background trend test per dataset.
///
/// Runs share only the read-only datasets; each has its own cancellation
/// flag and event channel.
///
/// # Errors
///
/// Returns [`AnalysisError::Spawn`] if a worker cannot be started; runs
/// already started are cancelled.
pub fn run_trend_tests(
    datasets: &[Arc<DoseResponseDataset>],
    config: &TrendTestConfig,
) -> Result<TrendBatch, AnalysisError> {
    let handles = datasets
        .iter()
        .map(|dataset| {
            let dataset = Arc::clone(dataset);
            let config = config.clone();
            task::spawn_task("trend", dataset.name.clone(), move |control| {
                run_trend_test(&dataset, &config, control)
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(TrendBatch { handles })
}
