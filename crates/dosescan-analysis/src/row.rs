use serde::{Deserialize, Serialize};

use crate::annotation::GeneAnnotations;

/// Identity columns shared by every per-feature result.
///
/// Embedded by value (and flattened when serialized) in
/// [`AnovaResult`](crate::anova::AnovaResult) and
/// [`TrendResult`](crate::trend::TrendResult). Gene columns are absent until
/// [`FeatureRow::annotated`] is called.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub feature_id: String,
    /// `;`-joined reference gene ids.
    pub genes: Option<String>,
    /// `;`-joined gene symbols, parallel to `genes`.
    pub gene_symbols: Option<String>,
}

impl FeatureRow {
    #[must_use]
    pub fn new(feature_id: impl Into<String>) -> Self {
        Self {
            feature_id: feature_id.into(),
            genes: None,
            gene_symbols: None,
        }
    }

    /// Fills the gene columns from `annotations`.
    ///
    /// Features without an annotation get empty strings, so an annotated row
    /// is always distinguishable from one that was never decorated.
    #[must_use]
    pub fn annotated(self, annotations: &GeneAnnotations) -> Self {
        let genes = annotations.genes_for(&self.feature_id);
        let ids = genes.iter().map(|g| g.id.as_str()).collect::<Vec<_>>();
        let symbols = genes.iter().map(|g| g.symbol.as_str()).collect::<Vec<_>>();
        Self {
            genes: Some(ids.join(";")),
            gene_symbols: Some(symbols.join(";")),
            ..self
        }
    }
}
