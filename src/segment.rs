//! Mapping from cluster ids to business segments

use crate::error::{Result, SegmentError};
use crate::model::ClusterModel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Business-meaningful customer segments, in report order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentTier {
    /// High spend, frequent and recent
    Vip,
    /// Consistent spend with good frequency
    Loyal,
    /// Low spend and low frequency, price driven
    Casual,
    /// Long time since last purchase
    Churned,
}

impl SegmentTier {
    pub const ALL: [SegmentTier; 4] = [
        SegmentTier::Vip,
        SegmentTier::Loyal,
        SegmentTier::Casual,
        SegmentTier::Churned,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SegmentTier::Vip => "VIP (Gold)",
            SegmentTier::Loyal => "Loyal (Silver)",
            SegmentTier::Casual => "Casual (Bronze)",
            SegmentTier::Churned => "Inactive (Churn)",
        }
    }

    pub fn recommended_action(self) -> &'static str {
        match self {
            SegmentTier::Vip => {
                "VIP service, early access to products and free shipping; full retention focus"
            }
            SegmentTier::Loyal => {
                "Loyalty points programme and cross-sell of complementary products"
            }
            SegmentTier::Casual => {
                "Aggressive discount coupons and multi-buy promotions to build a buying habit"
            }
            SegmentTier::Churned => {
                "\"We miss you\" reactivation e-mails; stop marketing spend if there is no response"
            }
        }
    }
}

impl fmt::Display for SegmentTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One `cluster id -> tier` binding as written in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentBinding {
    pub cluster: u32,
    pub tier: SegmentTier,
}

/// Bindings of the reference K-Means model
pub fn default_bindings() -> Vec<SegmentBinding> {
    vec![
        SegmentBinding {
            cluster: 2,
            tier: SegmentTier::Vip,
        },
        SegmentBinding {
            cluster: 3,
            tier: SegmentTier::Loyal,
        },
        SegmentBinding {
            cluster: 0,
            tier: SegmentTier::Casual,
        },
        SegmentBinding {
            cluster: 1,
            tier: SegmentTier::Churned,
        },
    ]
}

/// Validated total mapping from cluster id to segment
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentLabeler {
    mapping: BTreeMap<u32, SegmentTier>,
}

impl SegmentLabeler {
    /// Build from bindings; a cluster id bound twice is rejected.
    pub fn from_bindings(bindings: &[SegmentBinding]) -> Result<Self> {
        let mut mapping = BTreeMap::new();
        for binding in bindings {
            if let Some(previous) = mapping.insert(binding.cluster, binding.tier) {
                return Err(SegmentError::InvalidSegmentConfig(format!(
                    "cluster {} is bound to both {:?} and {:?}",
                    binding.cluster, previous, binding.tier
                )));
            }
        }
        if mapping.is_empty() {
            return Err(SegmentError::InvalidSegmentConfig(
                "no segment bindings configured".to_string(),
            ));
        }
        Ok(Self { mapping })
    }

    /// Fail with the first model cluster id that has no binding.
    pub fn ensure_covers(&self, model: &ClusterModel) -> Result<()> {
        match model
            .cluster_ids()
            .iter()
            .find(|id| !self.mapping.contains_key(*id))
        {
            Some(&cluster_id) => Err(SegmentError::UnmappedCluster { cluster_id }),
            None => Ok(()),
        }
    }

    pub fn label(&self, cluster_id: u32) -> Result<SegmentTier> {
        self.mapping
            .get(&cluster_id)
            .copied()
            .ok_or(SegmentError::UnmappedCluster { cluster_id })
    }

    pub fn bindings(&self) -> impl Iterator<Item = (u32, SegmentTier)> + '_ {
        self.mapping.iter().map(|(id, tier)| (*id, *tier))
    }
}

impl Default for SegmentLabeler {
    fn default() -> Self {
        Self {
            mapping: default_bindings()
                .into_iter()
                .map(|b| (b.cluster, b.tier))
                .collect(),
        }
    }
}
