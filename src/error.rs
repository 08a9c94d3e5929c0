//! Error taxonomy for the segmentation core

use crate::schema::Feature;
use std::path::PathBuf;
use thiserror::Error;

/// Which pre-trained artifact an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Scaler,
    ClusterModel,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactKind::Scaler => f.write_str("scaling model"),
            ArtifactKind::ClusterModel => f.write_str("cluster model"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("{kind} artifact at {} could not be loaded: {reason}", path.display())]
    MissingArtifact {
        kind: ArtifactKind,
        path: PathBuf,
        reason: String,
    },

    #[error("{kind} artifact is invalid: {reason}")]
    InvalidArtifact { kind: ArtifactKind, reason: String },

    #[error("unsupported input format for {}: expected delimited text (.csv, .tsv, .txt) or a spreadsheet (.xlsx, .xls, .ods)", path.display())]
    UnsupportedInputFormat { path: PathBuf },

    #[error("input is missing required column(s): {}", missing.join(", "))]
    MissingRequiredColumn { missing: Vec<String> },

    #[error("row {row}: cannot parse {column} value {value:?}")]
    InvalidField {
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error("{context}: expected {expected} features, found {found}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{context}: feature order {found:?} does not match {expected:?}")]
    SchemaMismatch {
        context: &'static str,
        expected: Vec<Feature>,
        found: Vec<Feature>,
    },

    #[error("cluster {cluster_id} has no segment mapping; the labeling configuration is stale for this model")]
    UnmappedCluster { cluster_id: u32 },

    #[error("customer {customer_id}: monetary amount exceeds the supported range")]
    AmountOverflow { customer_id: i64 },

    #[error("customer {customer_id} has no dated purchase; recency cannot be computed")]
    MissingPurchaseDate { customer_id: i64 },

    #[error("invalid segment configuration: {0}")]
    InvalidSegmentConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Polars(#[from] polars::error::PolarsError),

    #[error("spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),
}

impl SegmentError {
    /// Errors that make the process unable to serve any batch: broken
    /// artifacts, or a labeling configuration that does not fit the model.
    pub fn is_startup_fatal(&self) -> bool {
        matches!(
            self,
            SegmentError::MissingArtifact { .. }
                | SegmentError::InvalidArtifact { .. }
                | SegmentError::InvalidSegmentConfig(_)
                | SegmentError::SchemaMismatch { .. }
                | SegmentError::UnmappedCluster { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SegmentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_columns_message_lists_all() {
        let err = SegmentError::MissingRequiredColumn {
            missing: vec!["Quantity".to_string(), "CustomerID".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "input is missing required column(s): Quantity, CustomerID"
        );
    }

    #[test]
    fn test_fatal_classification() {
        let missing = SegmentError::MissingArtifact {
            kind: ArtifactKind::Scaler,
            path: PathBuf::from("models/rfm_scaler.json"),
            reason: "No such file or directory".to_string(),
        };
        assert!(missing.is_startup_fatal());
        assert!(missing.to_string().contains("scaling model"));

        let unmapped = SegmentError::UnmappedCluster { cluster_id: 7 };
        assert!(unmapped.is_startup_fatal());

        let overflow = SegmentError::AmountOverflow { customer_id: 17850 };
        assert!(!overflow.is_startup_fatal());
        let bad_row = SegmentError::InvalidField {
            row: 3,
            column: "Quantity",
            value: "six".to_string(),
        };
        assert!(!bad_row.is_startup_fatal());
    }
}
