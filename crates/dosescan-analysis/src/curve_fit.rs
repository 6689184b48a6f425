//! Curve-fit result model and best-model selection
//!
//! The numerical fitting happens elsewhere; this module validates the fitter's
//! output, derives the values reported for it and picks the best model per
//! feature.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::AnalysisError;

/// Dose-response model family of a fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "kebab-case")]
pub enum ModelFamily {
    /// Degree 0 is the constant (no effect) model, degree 1 the linear model.
    Polynomial { degree: u8 },
    /// Exponential models 2 to 5.
    Exponential { shape: u8 },
    Hill,
    Power,
}

impl ModelFamily {
    /// Display name used in reports and column headers.
    ///
    /// ```
    /// use dosescan_analysis::curve_fit::ModelFamily;
    ///
    /// assert_eq!(ModelFamily::Polynomial { degree: 1 }.name(), "Linear");
    /// assert_eq!(ModelFamily::Polynomial { degree: 3 }.name(), "Poly 3");
    /// assert_eq!(ModelFamily::Exponential { shape: 4 }.name(), "Exp 4");
    /// ```
    #[must_use]
    pub fn name(self) -> String {
        match self {
            Self::Polynomial { degree: 0 } => "Constant".to_owned(),
            Self::Polynomial { degree: 1 } => "Linear".to_owned(),
            Self::Polynomial { degree } => format!("Poly {degree}"),
            Self::Exponential { shape } => format!("Exp {shape}"),
            Self::Hill => "Hill".to_owned(),
            Self::Power => "Power".to_owned(),
        }
    }

    /// Names of the curve parameters, in the order the fitter reports them.
    #[must_use]
    pub fn parameter_names(self) -> Vec<String> {
        let names: &[&str] = match self {
            Self::Polynomial { degree } => {
                return (0..=degree).map(|i| format!("beta_{i}")).collect();
            }
            Self::Exponential { shape: 2 } => &["a", "b"],
            Self::Exponential { shape: 3 } => &["a", "b", "d"],
            Self::Exponential { shape: 4 } => &["a", "b", "c"],
            Self::Exponential { .. } => &["a", "b", "c", "d"],
            Self::Hill => &["intercept", "v", "n", "k"],
            Self::Power => &["control", "slope", "power"],
        };
        names.iter().map(|&n| n.to_owned()).collect()
    }

    #[must_use]
    pub fn parameter_count(self) -> usize {
        match self {
            Self::Polynomial { degree } => usize::from(degree) + 1,
            Self::Exponential { shape: 2 } => 2,
            Self::Exponential { shape: 3 | 4 } | Self::Power => 3,
            Self::Exponential { .. } | Self::Hill => 4,
        }
    }

    fn validate(self) -> Result<(), AnalysisError> {
        match self {
            Self::Exponential { shape } if !(2..=5).contains(&shape) => {
                Err(AnalysisError::InvalidConfig {
                    name: "exponential model shape",
                    value: shape.to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Direction of the adverse effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "lowercase")]
pub enum AdverseDirection {
    #[display("up")]
    Up,
    #[display("down")]
    Down,
}

/// Raw output of a fitter for one feature and model.
///
/// Turned into a [`CurveFitResult`] by [`CurveFitResult::new`], which checks it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveFit {
    pub feature_id: String,
    #[serde(flatten)]
    pub family: ModelFamily,
    #[serde(with = "crate::serde_float::vec")]
    pub parameters: Vec<f64>,
    #[serde(with = "crate::serde_float")]
    pub bmd: f64,
    #[serde(with = "crate::serde_float")]
    pub bmdl: f64,
    #[serde(with = "crate::serde_float")]
    pub bmdu: f64,
    #[serde(with = "crate::serde_float")]
    pub fit_p_value: f64,
    #[serde(with = "crate::serde_float")]
    pub log_likelihood: f64,
    #[serde(with = "crate::serde_float")]
    pub aic: f64,
    pub adverse_direction: AdverseDirection,
    pub success: bool,
}

/// A validated fit of one model to one feature. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CurveFit", into = "CurveFit")]
pub struct CurveFitResult {
    fit: CurveFit,
}

impl TryFrom<CurveFit> for CurveFitResult {
    type Error = AnalysisError;

    fn try_from(fit: CurveFit) -> Result<Self, Self::Error> {
        Self::new(fit)
    }
}

impl From<CurveFitResult> for CurveFit {
    fn from(result: CurveFitResult) -> Self {
        result.fit
    }
}

/// One cell of the tabular export of a fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Number(#[serde(with = "crate::serde_float")] f64),
    Direction(AdverseDirection),
    Flag(bool),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Direction(d) => write!(f, "{d}"),
            Self::Flag(b) => write!(f, "{b}"),
        }
    }
}

impl CurveFitResult {
    /// Validates a fitter's output.
    ///
    /// # Errors
    ///
    /// - [`AnalysisError::InvalidConfig`] for an exponential shape outside 2 to 5.
    /// - [`AnalysisError::InvalidParameters`] when the parameter vector does
    ///   not match the model. A failed fit may carry no parameters at all.
    /// - [`AnalysisError::InconsistentBounds`] when BMDL, BMD and BMDU are all
    ///   finite but not ordered `BMDL <= BMD <= BMDU`.
    pub fn new(fit: CurveFit) -> Result<Self, AnalysisError> {
        fit.family.validate()?;
        let expected = fit.family.parameter_count();
        let actual = fit.parameters.len();
        if actual != expected && !(actual == 0 && !fit.success) {
            return Err(AnalysisError::InvalidParameters {
                model: fit.family.name(),
                expected,
                actual,
            });
        }
        let bounds = [fit.bmdl, fit.bmd, fit.bmdu];
        if bounds.iter().all(|b| b.is_finite()) && !(fit.bmdl <= fit.bmd && fit.bmd <= fit.bmdu) {
            return Err(AnalysisError::InconsistentBounds {
                bmdl: fit.bmdl,
                bmd: fit.bmd,
                bmdu: fit.bmdu,
            });
        }
        Ok(Self { fit })
    }

    #[must_use]
    pub fn feature_id(&self) -> &str {
        &self.fit.feature_id
    }

    #[must_use]
    pub fn family(&self) -> ModelFamily {
        self.fit.family
    }

    #[must_use]
    pub fn parameters(&self) -> &[f64] {
        &self.fit.parameters
    }

    #[must_use]
    pub fn bmd(&self) -> f64 {
        self.fit.bmd
    }

    #[must_use]
    pub fn bmdl(&self) -> f64 {
        self.fit.bmdl
    }

    #[must_use]
    pub fn bmdu(&self) -> f64 {
        self.fit.bmdu
    }

    #[must_use]
    pub fn fit_p_value(&self) -> f64 {
        self.fit.fit_p_value
    }

    #[must_use]
    pub fn log_likelihood(&self) -> f64 {
        self.fit.log_likelihood
    }

    #[must_use]
    pub fn aic(&self) -> f64 {
        self.fit.aic
    }

    #[must_use]
    pub fn adverse_direction(&self) -> AdverseDirection {
        self.fit.adverse_direction
    }

    #[must_use]
    pub fn success(&self) -> bool {
        self.fit.success
    }

    /// `BMD / BMDL`. Large values flag a poorly constrained lower bound.
    ///
    /// Non-finite when BMDL is zero or either value is non-finite.
    #[must_use]
    pub fn bmd_bmdl_ratio(&self) -> f64 {
        self.fit.bmd / self.fit.bmdl
    }

    #[must_use]
    pub fn model_name(&self) -> String {
        self.fit.family.name()
    }

    #[must_use]
    pub fn parameter_names(&self) -> Vec<String> {
        self.fit.family.parameter_names()
    }

    /// Export column headers, parallel to [`Self::row`].
    ///
    /// ```
    /// use dosescan_analysis::curve_fit::{AdverseDirection, CurveFit, CurveFitResult, ModelFamily};
    ///
    /// let fit = CurveFitResult::new(CurveFit {
    ///     feature_id: "1007_s_at".to_owned(),
    ///     family: ModelFamily::Polynomial { degree: 1 },
    ///     parameters: vec![1.0, 0.5],
    ///     bmd: 2.0,
    ///     bmdl: 1.0,
    ///     bmdu: 4.0,
    ///     fit_p_value: 0.3,
    ///     log_likelihood: -10.0,
    ///     aic: 26.0,
    ///     adverse_direction: AdverseDirection::Up,
    ///     success: true,
    /// })?;
    /// let columns = fit.column_names();
    /// assert_eq!(columns[0], "Linear BMD");
    /// assert_eq!(columns.last().unwrap(), "Linear Parameter beta_1");
    /// assert_eq!(columns.len(), fit.row().len());
    /// # Ok::<(), dosescan_analysis::AnalysisError>(())
    /// ```
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        let name = self.model_name();
        let fixed = [
            "BMD",
            "BMDL",
            "BMDU",
            "fitPValue",
            "fitLogLikelihood",
            "AIC",
            "adverseDirection",
            "BMD/BMDL",
            "Success",
        ]
        .iter()
        .map(|column| format!("{name} {column}"));
        let parameters = self
            .fit
            .parameters
            .iter()
            .zip(self.parameter_names())
            .map(|(_, parameter)| format!("{name} Parameter {parameter}"));
        fixed.chain(parameters).collect()
    }

    /// Export row, parallel to [`Self::column_names`].
    #[must_use]
    pub fn row(&self) -> Vec<Cell> {
        let fit = &self.fit;
        [
            Cell::Number(fit.bmd),
            Cell::Number(fit.bmdl),
            Cell::Number(fit.bmdu),
            Cell::Number(fit.fit_p_value),
            Cell::Number(fit.log_likelihood),
            Cell::Number(fit.aic),
            Cell::Direction(fit.adverse_direction),
            Cell::Number(self.bmd_bmdl_ratio()),
            Cell::Flag(fit.success),
        ]
        .into_iter()
        .chain(fit.parameters.iter().map(|&p| Cell::Number(p)))
        .collect()
    }
}

/// Akaike information criterion, `2k - 2 logL` with `k = parameter_count + 1`.
///
/// The extra parameter accounts for the estimated residual variance.
///
/// ```
/// use dosescan_analysis::curve_fit::aic;
///
/// assert_eq!(aic(-10.0, 2), 26.0);
/// ```
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn aic(log_likelihood: f64, parameter_count: usize) -> f64 {
    2.0 * (parameter_count + 1) as f64 - 2.0 * log_likelihood
}

/// Picks the converged fit with the lowest AIC.
///
/// Ties go to the model with fewer parameters, then to the earlier candidate.
/// Fits with a NaN AIC are never selected. Returns `None` when no candidate
/// is acceptable.
#[must_use]
pub fn select_best_model(candidates: &[CurveFitResult]) -> Option<&CurveFitResult> {
    best_of(candidates)
}

/// Best model per feature. Features with no acceptable model map to `None`.
#[must_use]
pub fn best_models_by_feature(
    fits: &[CurveFitResult],
) -> BTreeMap<&str, Option<&CurveFitResult>> {
    let mut by_feature = BTreeMap::<&str, Vec<&CurveFitResult>>::new();
    for fit in fits {
        by_feature.entry(fit.feature_id()).or_default().push(fit);
    }
    by_feature
        .into_iter()
        .map(|(feature, candidates)| (feature, best_of(candidates)))
        .collect()
}

fn best_of<'a>(
    candidates: impl IntoIterator<Item = &'a CurveFitResult>,
) -> Option<&'a CurveFitResult> {
    candidates
        .into_iter()
        .filter(|c| c.success() && !c.aic().is_nan())
        .min_by(|a, b| {
            a.aic()
                .total_cmp(&b.aic())
                .then_with(|| a.family().parameter_count().cmp(&b.family().parameter_count()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fit(family: ModelFamily, aic: f64, success: bool) -> CurveFit {
        CurveFit {
            feature_id: "f".to_owned(),
            family,
            parameters: vec![0.5; family.parameter_count()],
            bmd: 2.0,
            bmdl: 1.0,
            bmdu: 3.0,
            fit_p_value: 0.5,
            log_likelihood: -aic / 2.0,
            aic,
            adverse_direction: AdverseDirection::Up,
            success,
        }
    }

    fn poly(degree: u8, aic: f64, success: bool) -> CurveFitResult {
        CurveFitResult::new(fit(ModelFamily::Polynomial { degree }, aic, success)).unwrap()
    }

    mod selection {
        use super::*;

        #[test]
        fn test_lowest_successful_aic() {
            let candidates = [poly(1, 50.0, true), poly(2, 40.0, false), poly(3, 60.0, true)];
            let best = select_best_model(&candidates).unwrap();
            assert_eq!(best.aic(), 50.0);
        }

        #[test]
        fn test_tie_prefers_simpler_model() {
            let candidates = [poly(3, 50.0, true), poly(1, 50.0, true), poly(2, 50.0, true)];
            let best = select_best_model(&candidates).unwrap();
            assert_eq!(best.family(), ModelFamily::Polynomial { degree: 1 });
        }

        #[test]
        fn test_no_acceptable_model() {
            assert!(select_best_model(&[]).is_none());
            let candidates = [poly(1, 50.0, false), poly(2, f64::NAN, true)];
            assert!(select_best_model(&candidates).is_none());
        }

        #[test]
        fn test_best_per_feature() {
            let other = CurveFitResult::new(CurveFit {
                feature_id: "g".to_owned(),
                ..fit(ModelFamily::Hill, 10.0, false)
            })
            .unwrap();
            let fits = [poly(1, 50.0, true), other, poly(2, 45.0, true)];
            let best = best_models_by_feature(&fits);
            assert_eq!(best.len(), 2);
            assert_eq!(best["f"].unwrap().aic(), 45.0);
            assert!(best["g"].is_none());
        }
    }

    mod validation {
        use super::*;

        #[test]
        fn test_inconsistent_bounds() {
            let err = CurveFitResult::new(CurveFit {
                bmdl: 2.5,
                ..fit(ModelFamily::Power, 1.0, true)
            })
            .unwrap_err();
            assert!(err.is_inconsistent_bounds());
        }

        #[test]
        fn test_non_finite_bounds_skip_ordering() {
            let result = CurveFitResult::new(CurveFit {
                bmdl: f64::NAN,
                bmdu: f64::INFINITY,
                ..fit(ModelFamily::Power, 1.0, true)
            })
            .unwrap();
            assert!(result.bmd_bmdl_ratio().is_nan());
        }

        #[test]
        fn test_parameter_count() {
            let err = CurveFitResult::new(CurveFit {
                parameters: vec![1.0],
                ..fit(ModelFamily::Hill, 1.0, true)
            })
            .unwrap_err();
            assert!(err.is_invalid_parameters());

            let failed = CurveFitResult::new(CurveFit {
                parameters: vec![],
                ..fit(ModelFamily::Hill, 1.0, false)
            });
            assert!(failed.is_ok());
        }

        #[test]
        fn test_exponential_shape() {
            let err = CurveFitResult::new(fit(ModelFamily::Exponential { shape: 1 }, 1.0, true))
                .unwrap_err();
            assert!(err.is_invalid_config());
            assert!(
                CurveFitResult::new(fit(ModelFamily::Exponential { shape: 5 }, 1.0, true)).is_ok()
            );
        }
    }

    mod export {
        use super::*;

        #[test]
        fn test_model_names() {
            let names = [
                ModelFamily::Polynomial { degree: 0 },
                ModelFamily::Polynomial { degree: 2 },
                ModelFamily::Exponential { shape: 3 },
                ModelFamily::Hill,
                ModelFamily::Power,
            ]
            .map(ModelFamily::name);
            assert_eq!(names, ["Constant", "Poly 2", "Exp 3", "Hill", "Power"]);
        }

        #[test]
        fn test_parameter_names_match_count() {
            let families = [
                ModelFamily::Polynomial { degree: 4 },
                ModelFamily::Exponential { shape: 2 },
                ModelFamily::Exponential { shape: 3 },
                ModelFamily::Exponential { shape: 4 },
                ModelFamily::Exponential { shape: 5 },
                ModelFamily::Hill,
                ModelFamily::Power,
            ];
            for family in families {
                assert_eq!(family.parameter_names().len(), family.parameter_count());
            }
            assert_eq!(
                ModelFamily::Polynomial { degree: 2 }.parameter_names(),
                ["beta_0", "beta_1", "beta_2"]
            );
        }

        #[test]
        fn test_row() {
            let result = poly(2, 12.0, true);
            let row = result.row();
            assert_eq!(row.len(), 9 + 3);
            assert_eq!(row[7], Cell::Number(2.0));
            assert_eq!(row[6], Cell::Direction(AdverseDirection::Up));
            assert_eq!(row[8], Cell::Flag(true));
            assert_eq!(result.column_names()[7], "Poly 2 BMD/BMDL");
        }

        #[test]
        fn test_aic_helper() {
            assert_eq!(aic(-5.0, 3), 18.0);
        }
    }

    #[test]
    fn test_roundtrip_keeps_non_finite_values() {
        let result = CurveFitResult::new(CurveFit {
            bmdu: f64::INFINITY,
            ..fit(ModelFamily::Exponential { shape: 4 }, 20.0, true)
        })
        .unwrap();
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains(r#""family":"exponential""#));
        assert!(json.contains(r#""bmdu":"inf""#));
        let restored: CurveFitResult = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, result);
    }

    #[test]
    fn test_roundtrip_failed_fit_with_nan_parameters() {
        let result = CurveFitResult::new(CurveFit {
            parameters: vec![f64::NAN; 4],
            ..fit(ModelFamily::Hill, 30.0, false)
        })
        .unwrap();
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains(r#""parameters":["NaN","NaN","NaN","NaN"]"#));

        let restored: CurveFitResult = serde_json::from_str(&json).unwrap();
        assert!(!restored.success());
        assert_eq!(restored.family(), ModelFamily::Hill);
        assert_eq!(restored.parameters().len(), 4);
        assert!(restored.parameters().iter().all(|p| p.is_nan()));
        assert_eq!(restored.bmd(), result.bmd());
    }

    #[test]
    fn test_deserialize_validates() {
        let mut value = serde_json::to_value(poly(1, 10.0, true)).unwrap();
        value["bmdl"] = serde_json::json!(5.0);
        let result: Result<CurveFitResult, _> = serde_json::from_value(value);
        assert!(result.is_err());
    }
}
