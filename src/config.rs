//! Configuration management for the segmentation tool

use crate::segment::{default_bindings, SegmentBinding};
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub artifacts: ArtifactsConfig,
    /// Cluster id to segment bindings; must cover every cluster of the model
    #[serde(default = "default_bindings")]
    pub segments: Vec<SegmentBinding>,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

/// Locations of the pre-trained artifacts
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactsConfig {
    pub scaler_path: PathBuf,
    pub cluster_model_path: PathBuf,
}

/// Report destinations
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Customer-level CSV report
    pub report_path: PathBuf,
    /// Optional per-segment counts CSV
    #[serde(default)]
    pub summary_path: Option<PathBuf>,
    /// Optional PNG bar chart of segment counts
    #[serde(default)]
    pub chart_path: Option<PathBuf>,
    /// Top spenders printed after each batch
    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,
}

fn default_preview_rows() -> usize {
    10
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Default configuration file, used when present
    pub const DEFAULT_PATH: &'static str = "config/config.toml";

    /// Load `config/config.toml` if it exists, otherwise defaults; `RFM__*`
    /// environment variables override either.
    pub fn load() -> Result<Self> {
        let default_path = Path::new(Self::DEFAULT_PATH);
        if default_path.exists() {
            Self::load_from_path(default_path)
        } else {
            Self::load_layers(None)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_layers(Some(path.as_ref()))
    }

    fn load_layers(path: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default(
                "artifacts.scaler_path",
                path_string(&defaults.artifacts.scaler_path),
            )?
            .set_default(
                "artifacts.cluster_model_path",
                path_string(&defaults.artifacts.cluster_model_path),
            )?
            .set_default("output.report_path", path_string(&defaults.output.report_path))?
            .set_default("output.preview_rows", defaults.output.preview_rows as u64)?
            .set_default("logging.level", defaults.logging.level)?
            .set_default("logging.format", defaults.logging.format)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        builder
            .add_source(Environment::with_prefix("RFM").separator("__"))
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            artifacts: ArtifactsConfig {
                scaler_path: PathBuf::from("models/rfm_scaler.json"),
                cluster_model_path: PathBuf::from("models/kmeans_model.json"),
            },
            segments: default_bindings(),
            output: OutputConfig {
                report_path: PathBuf::from("segmented_customers.csv"),
                summary_path: None,
                chart_path: None,
                preview_rows: default_preview_rows(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}
