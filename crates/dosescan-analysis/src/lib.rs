//! Dose-response prefilters and curve-fit model selection
//!
//! This crate turns per-feature replicate measurements into the statistics
//! used to pick dose-responsive features and to rank fitted models.
//!
//! # Overview
//!
//! ## Prefilter Workflow
//!
//! 1. **Load Measurements** ([`measurement::DoseResponseDataset`]): features with replicate
//!    values grouped by dose, lowest dose first
//! 2. **Test** with either prefilter:
//!    - [`anova::prefilter_anova`]: one-way ANOVA F test per feature
//!    - [`trend::run_trend_test`]: Williams trend statistic with permutation p-values
//! 3. **Correct** ([`correction::CorrectionMethod`]): Benjamini-Hochberg or Bonferroni
//!    over the whole feature set
//! 4. **Decorate** ([`annotation::GeneAnnotations`]): attach gene ids and symbols
//!
//! ## Background Runs
//!
//! Long runs execute on worker threads ([`task`]). Each run reports progress,
//! can be cancelled cooperatively and finishes with exactly one
//! [`task::TaskOutcome`]:
//!
//! - [`anova::spawn_anova`]: ANOVA prefilter on a worker
//! - [`trend::run_trend_tests`]: one trend test worker per dataset
//!
//! ## Model Selection
//!
//! [`curve_fit::CurveFitResult`] validates the output of an external fitter;
//! [`curve_fit::select_best_model`] picks the converged fit with the lowest AIC.
//!
//! # Examples
//!
//! ```
//! use dosescan_analysis::{
//!     anova::{self, AnovaConfig},
//!     measurement::{DoseResponseDataset, FeatureMeasurement},
//!     task::Unattended,
//! };
//!
//! let feature = FeatureMeasurement::from_columns(
//!     "1007_s_at",
//!     &[0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 10.0, 10.0, 10.0],
//!     &[5.0, 5.0, 5.0, 6.0, 6.0, 6.0, 20.0, 20.0, 20.0],
//! )?;
//! let dataset = DoseResponseDataset::new("liver", vec![feature]);
//!
//! let results = anova::prefilter_anova(&dataset, &AnovaConfig::default(), &Unattended)?;
//! let result = &results.results[0];
//! assert!(result.p_value < 0.01);
//! assert_eq!(result.best_fold_change, Some(2.0));
//! # Ok::<(), dosescan_analysis::AnalysisError>(())
//! ```

pub use self::error::AnalysisError;

pub mod annotation;
pub mod anova;
pub mod correction;
pub mod curve_fit;
mod error;
pub mod fold_change;
pub mod measurement;
pub mod row;
mod serde_float;
pub mod task;
pub mod trend;
