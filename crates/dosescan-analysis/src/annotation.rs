//! Reference gene annotations for features.
//!
//! Annotations are passed explicitly to the decoration step
//! ([`FeatureRow::annotated`](crate::row::FeatureRow::annotated)); nothing is
//! looked up from global state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A gene a feature (probe) maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceGene {
    pub id: String,
    pub symbol: String,
}

/// Mapping from feature id to its reference genes, in annotation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeneAnnotations {
    by_feature: HashMap<String, Vec<ReferenceGene>>,
}

impl GeneAnnotations {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the genes of `feature_id`, replacing any earlier entry.
    pub fn insert(&mut self, feature_id: impl Into<String>, genes: Vec<ReferenceGene>) {
        self.by_feature.insert(feature_id.into(), genes);
    }

    /// Genes annotated to `feature_id`; empty when the feature is unknown.
    #[must_use]
    pub fn genes_for(&self, feature_id: &str) -> &[ReferenceGene] {
        self.by_feature.get(feature_id).map_or(&[], Vec::as_slice)
    }
}

impl FromIterator<(String, Vec<ReferenceGene>)> for GeneAnnotations {
    fn from_iter<T: IntoIterator<Item = (String, Vec<ReferenceGene>)>>(iter: T) -> Self {
        Self {
            by_feature: iter.into_iter().collect(),
        }
    }
}
