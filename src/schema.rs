//! Ordered feature schema shared by profile construction and the fitted models

use crate::error::{Result, SegmentError};
use serde::{Deserialize, Serialize};

/// One behavioral feature of a customer profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    Recency,
    Frequency,
    Monetary,
}

/// Feature order every profile vector is built in.
pub const RFM_FEATURES: [Feature; 3] = [Feature::Recency, Feature::Frequency, Feature::Monetary];

/// An explicit, ordered list of features a vector or model is laid out in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema {
    features: Vec<Feature>,
}

impl FeatureSchema {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }

    /// The `[Recency, Frequency, Monetary]` schema produced by the aggregator
    pub fn rfm() -> Self {
        Self::new(RFM_FEATURES.to_vec())
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Check that `other` lists exactly the same features in the same order.
    pub fn ensure_matches(&self, other: &FeatureSchema, context: &'static str) -> Result<()> {
        if self.len() != other.len() {
            return Err(SegmentError::DimensionMismatch {
                context,
                expected: self.len(),
                found: other.len(),
            });
        }
        if self.features != other.features {
            return Err(SegmentError::SchemaMismatch {
                context,
                expected: self.features.clone(),
                found: other.features.clone(),
            });
        }
        Ok(())
    }
}
