//! Multiple-testing correction over a whole feature set.
//!
//! Features are ranked by ascending raw p-value, ties broken by feature id, so
//! the adjustment is reproducible regardless of input order. Features with the
//! same raw p-value always receive the same adjusted p-value.

use std::{cmp::Ordering, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::AnalysisError;

/// A multiple-testing correction method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CorrectionMethod {
    /// Benjamini-Hochberg step-up false discovery rate.
    #[default]
    BenjaminiHochberg,
    /// Bonferroni family-wise error rate.
    Bonferroni,
}

impl FromStr for CorrectionMethod {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bh" | "benjamini-hochberg" | "fdr" => Ok(Self::BenjaminiHochberg),
            "bonferroni" => Ok(Self::Bonferroni),
            _ => Err(AnalysisError::InvalidConfig {
                name: "correction method",
                value: s.to_owned(),
            }),
        }
    }
}

impl CorrectionMethod {
    /// Adjusts `(feature_id, p_value)` pairs, returning adjusted p-values in input order.
    ///
    /// # Examples
    ///
    /// ```
    /// use dosescan_analysis::correction::CorrectionMethod;
    ///
    /// let entries = [("a", 0.0625), ("b", 0.25), ("c", 0.125)];
    /// let adjusted = CorrectionMethod::BenjaminiHochberg.adjust(&entries);
    /// assert_eq!(adjusted, vec![0.1875, 0.25, 0.1875]);
    ///
    /// let adjusted = CorrectionMethod::Bonferroni.adjust(&entries);
    /// assert_eq!(adjusted, vec![0.1875, 0.75, 0.375]);
    /// ```
    #[must_use]
    pub fn adjust(self, entries: &[(&str, f64)]) -> Vec<f64> {
        match self {
            Self::BenjaminiHochberg => benjamini_hochberg(entries),
            Self::Bonferroni => bonferroni(entries),
        }
    }
}

fn rank_order(entries: &[(&str, f64)]) -> Vec<usize> {
    let mut order = (0..entries.len()).collect::<Vec<_>>();
    order.sort_by(|&a, &b| {
        let (id_a, p_a) = entries[a];
        let (id_b, p_b) = entries[b];
        p_a.total_cmp(&p_b).then_with(|| id_a.cmp(id_b))
    });
    order
}

#[expect(clippy::cast_precision_loss)]
fn benjamini_hochberg(entries: &[(&str, f64)]) -> Vec<f64> {
    let m = entries.len() as f64;
    let order = rank_order(entries);
    let mut adjusted = vec![0.0; entries.len()];

    // Step-up: walk from the largest p-value down, keeping the running minimum.
    let mut running_min = f64::INFINITY;
    for (rank0, &idx) in order.iter().enumerate().rev() {
        let rank = (rank0 + 1) as f64;
        let candidate = (entries[idx].1 * m / rank).min(1.0);
        running_min = running_min.min(candidate);
        adjusted[idx] = running_min;
    }

    // Tied raw p-values share the value of the best-ranked member of the tie.
    for window in order.windows(2) {
        let (prev, next) = (window[0], window[1]);
        if entries[prev].1.total_cmp(&entries[next].1) == Ordering::Equal {
            adjusted[next] = adjusted[prev];
        }
    }
    adjusted
}

#[expect(clippy::cast_precision_loss)]
fn bonferroni(entries: &[(&str, f64)]) -> Vec<f64> {
    let m = entries.len() as f64;
    entries.iter().map(|&(_, p)| (p * m).min(1.0)).collect()
}
