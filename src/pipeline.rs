//! Batch segmentation pipeline: clean, aggregate, scale, assign, label, report

use crate::data::{load_transactions, TransactionRecord};
use crate::error::Result;
use crate::model::{ClusterModel, ModelArtifacts, ScalingModel};
use crate::report::{ReportRow, SegmentReport};
use crate::rfm::{clean_records, compute_rfm_profiles, CustomerRfmProfile};
use crate::schema::FeatureSchema;
use crate::segment::SegmentLabeler;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

/// Pre-trained models plus labeling configuration, validated once and then
/// shared read-only across batches.
#[derive(Debug, Clone)]
pub struct SegmentationPipeline {
    scaler: ScalingModel,
    clusters: ClusterModel,
    labeler: SegmentLabeler,
}

impl SegmentationPipeline {
    /// Check that the artifacts agree with the RFM feature schema and that every
    /// cluster the model can emit has a segment.
    pub fn new(artifacts: ModelArtifacts, labeler: SegmentLabeler) -> Result<Self> {
        let rfm = FeatureSchema::rfm();
        rfm.ensure_matches(artifacts.scaler.schema(), "scaling model")?;
        rfm.ensure_matches(artifacts.clusters.schema(), "cluster model")?;
        labeler.ensure_covers(&artifacts.clusters)?;

        info!(
            clusters = ?artifacts.clusters.cluster_ids(),
            "Segmentation pipeline ready"
        );

        Ok(Self {
            scaler: artifacts.scaler,
            clusters: artifacts.clusters,
            labeler,
        })
    }

    pub fn clusters(&self) -> &ClusterModel {
        &self.clusters
    }

    pub fn labeler(&self) -> &SegmentLabeler {
        &self.labeler
    }

    /// Segment one materialized batch of raw rows.
    ///
    /// A batch with no valid customer yields an empty report, not an error.
    pub fn run(&self, records: &[TransactionRecord]) -> Result<SegmentReport> {
        let start = Instant::now();

        let cleaned = clean_records(records)?;
        let profiles = compute_rfm_profiles(&cleaned)?;

        if profiles.is_empty() {
            warn!(rows = records.len(), "Zero customers found after cleaning");
            return Ok(SegmentReport::default());
        }

        let rows = profiles
            .into_iter()
            .map(|profile| self.classify(profile))
            .collect::<Result<Vec<_>>>()?;
        let report = SegmentReport::assemble(rows);

        info!(
            rows = records.len(),
            valid_rows = cleaned.len(),
            customers = report.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Batch segmented"
        );

        Ok(report)
    }

    /// Load a transaction file and segment it.
    pub fn run_file(&self, path: &Path) -> Result<SegmentReport> {
        let batch = load_transactions(path)?;
        self.run(&batch.records)
    }

    /// Scale, assign and label one profile
    pub fn classify(&self, profile: CustomerRfmProfile) -> Result<ReportRow> {
        let scaled = self.scaler.transform(&profile.feature_vector())?;
        let cluster_id = self.clusters.predict(&scaled)?;
        let segment = self.labeler.label(cluster_id)?;

        Ok(ReportRow {
            profile,
            cluster_id,
            segment,
        })
    }
}
