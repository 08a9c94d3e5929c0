//! Command-line interface definitions and argument parsing

use crate::config::AppConfig;
use clap::Parser;
use std::path::{Path, PathBuf};

/// Segment customers of a transaction log with a pre-trained RFM K-Means model
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Transaction file(s) to segment (CSV/TSV/TXT or XLSX/XLS/ODS); each is an independent batch
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<PathBuf>,

    /// Configuration file (TOML); defaults to config/config.toml when present
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Fitted scaler artifact (overrides configuration)
    #[arg(long)]
    pub scaler: Option<PathBuf>,

    /// Fitted cluster model artifact (overrides configuration)
    #[arg(long)]
    pub cluster_model: Option<PathBuf>,

    /// Output path for the segmented customer CSV
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output path for the per-segment counts CSV
    #[arg(short, long)]
    pub summary: Option<PathBuf>,

    /// Output path for the segment bar chart (PNG)
    #[arg(long)]
    pub chart: Option<PathBuf>,

    /// Number of top spenders to print per batch
    #[arg(short, long)]
    pub preview: Option<usize>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Apply command-line overrides on top of loaded configuration
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(path) = &self.scaler {
            config.artifacts.scaler_path = path.clone();
        }
        if let Some(path) = &self.cluster_model {
            config.artifacts.cluster_model_path = path.clone();
        }
        if let Some(path) = &self.output {
            config.output.report_path = path.clone();
        }
        if let Some(path) = &self.summary {
            config.output.summary_path = Some(path.clone());
        }
        if let Some(path) = &self.chart {
            config.output.chart_path = Some(path.clone());
        }
        if let Some(rows) = self.preview {
            config.output.preview_rows = rows;
        }
        if self.verbose {
            config.logging.level = "debug".to_string();
        }
    }
}

/// Output path for one batch.
///
/// With several inputs the input stem is appended so batches never overwrite
/// each other: `report.csv` + `march.csv` -> `report_march.csv`.
pub fn batch_output_path(base: &Path, input: &Path, multiple_inputs: bool) -> PathBuf {
    if !multiple_inputs {
        return base.to_path_buf();
    }

    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let input_stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "batch".to_string());
    let file_name = match base.extension() {
        Some(ext) => format!("{stem}_{input_stem}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{input_stem}"),
    };

    base.with_file_name(file_name)
}
