//! RFM Segmenter: customer segmentation of raw sales logs with a pre-trained K-Means model
//!
//! Transactions are cleaned, reduced to one RFM (Recency, Frequency, Monetary)
//! profile per customer, scaled with the fitted scaler, assigned to the nearest
//! centroid and labeled with a business segment.

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod rfm;
pub mod schema;
pub mod segment;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use data::{load_transactions, TransactionRecord};
pub use error::SegmentError;
pub use model::{ClusterModel, ModelArtifacts, ScalingModel};
pub use pipeline::SegmentationPipeline;
pub use report::{ReportRow, SegmentCount, SegmentReport};
pub use rfm::{clean_records, compute_rfm_profiles, CustomerRfmProfile};
pub use schema::{Feature, FeatureSchema};
pub use segment::{SegmentLabeler, SegmentTier};
pub use viz::create_segment_chart;

/// Result type used at the application edge
pub type Result<T> = anyhow::Result<T>;
