//! Final per-customer segmentation table and per-segment summary

use crate::error::Result;
use crate::rfm::CustomerRfmProfile;
use crate::segment::SegmentTier;
use polars::prelude::*;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use tracing::info;

/// One customer's profile joined with its cluster and segment
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub profile: CustomerRfmProfile,
    pub cluster_id: u32,
    pub segment: SegmentTier,
}

/// Customers per segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentCount {
    pub segment: SegmentTier,
    pub customers: usize,
}

/// Exportable result of one batch
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SegmentReport {
    rows: Vec<ReportRow>,
    summary: Vec<SegmentCount>,
}

impl SegmentReport {
    /// Order rows by customer id and count customers per segment.
    ///
    /// Every row given appears in the report exactly once.
    pub fn assemble(mut rows: Vec<ReportRow>) -> Self {
        rows.sort_by_key(|row| row.profile.customer_id);

        let mut counts: BTreeMap<SegmentTier, usize> = BTreeMap::new();
        for row in &rows {
            *counts.entry(row.segment).or_default() += 1;
        }
        let summary = counts
            .into_iter()
            .map(|(segment, customers)| SegmentCount { segment, customers })
            .collect();

        Self { rows, summary }
    }

    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    /// Segments with at least one customer, in [`SegmentTier`] order
    pub fn summary(&self) -> &[SegmentCount] {
        &self.summary
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no customer survived cleaning
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn total_monetary(&self) -> Decimal {
        self.rows.iter().map(|row| row.profile.monetary).sum()
    }

    /// Highest spenders first, ties by customer id
    pub fn top_by_monetary(&self, n: usize) -> Vec<&ReportRow> {
        let mut ranked: Vec<&ReportRow> = self.rows.iter().collect();
        ranked.sort_by(|a, b| {
            b.profile
                .monetary
                .cmp(&a.profile.monetary)
                .then(a.profile.customer_id.cmp(&b.profile.customer_id))
        });
        ranked.truncate(n);
        ranked
    }

    /// Customer table as a DataFrame; Monetary stays an exact decimal string
    pub fn to_frame(&self) -> Result<DataFrame> {
        let customer_ids: Vec<i64> = self.rows.iter().map(|r| r.profile.customer_id).collect();
        let recency: Vec<i64> = self.rows.iter().map(|r| r.profile.recency).collect();
        let frequency: Vec<u64> = self.rows.iter().map(|r| r.profile.frequency).collect();
        let monetary: Vec<String> = self
            .rows
            .iter()
            .map(|r| r.profile.monetary.normalize().to_string())
            .collect();
        let cluster: Vec<u32> = self.rows.iter().map(|r| r.cluster_id).collect();
        let segment: Vec<&str> = self.rows.iter().map(|r| r.segment.name()).collect();
        let action: Vec<&str> = self
            .rows
            .iter()
            .map(|r| r.segment.recommended_action())
            .collect();

        Ok(DataFrame::new(vec![
            Series::new("CustomerID", customer_ids),
            Series::new("Recency", recency),
            Series::new("Frequency", frequency),
            Series::new("Monetary", monetary),
            Series::new("Cluster", cluster),
            Series::new("Segment", segment),
            Series::new("Action", action),
        ])?)
    }

    /// Segment counts as a DataFrame
    pub fn summary_frame(&self) -> Result<DataFrame> {
        let segment: Vec<&str> = self.summary.iter().map(|c| c.segment.name()).collect();
        let customers: Vec<u64> = self.summary.iter().map(|c| c.customers as u64).collect();

        Ok(DataFrame::new(vec![
            Series::new("Segment", segment),
            Series::new("Customers", customers),
        ])?)
    }

    /// Customer table rendered as CSV bytes
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        write_frame(&mut self.to_frame()?, &mut buffer)?;
        Ok(buffer)
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut file = File::create(path)?;
        write_frame(&mut self.to_frame()?, &mut file)?;
        info!(path = %path.display(), customers = self.len(), "Segment report written");
        Ok(())
    }

    pub fn write_summary_csv(&self, path: &Path) -> Result<()> {
        let mut file = File::create(path)?;
        write_frame(&mut self.summary_frame()?, &mut file)?;
        info!(path = %path.display(), segments = self.summary.len(), "Segment summary written");
        Ok(())
    }
}

fn write_frame<W: std::io::Write>(frame: &mut DataFrame, writer: &mut W) -> Result<()> {
    CsvWriter::new(writer).include_header(true).finish(frame)?;
    Ok(())
}
