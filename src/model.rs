//! Pre-trained scaling and K-Means artifacts: loading, scaling and nearest-centroid assignment

use crate::error::{ArtifactKind, Result, SegmentError};
use crate::schema::{Feature, FeatureSchema};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Artifact layout version this build understands
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScalerDocument {
    format_version: u32,
    features: Vec<Feature>,
    center: Vec<f64>,
    scale: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CentroidDocument {
    id: u32,
    center: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClusterDocument {
    format_version: u32,
    features: Vec<Feature>,
    centroids: Vec<CentroidDocument>,
}

/// Fitted per-feature affine transform: `(x - center) / scale`
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingModel {
    schema: FeatureSchema,
    center: Array1<f64>,
    scale: Array1<f64>,
}

impl ScalingModel {
    pub fn new(schema: FeatureSchema, center: Vec<f64>, scale: Vec<f64>) -> Result<Self> {
        let invalid = |reason: String| SegmentError::InvalidArtifact {
            kind: ArtifactKind::Scaler,
            reason,
        };

        if schema.is_empty() {
            return Err(invalid("no features listed".to_string()));
        }
        if center.len() != schema.len() || scale.len() != schema.len() {
            return Err(invalid(format!(
                "{} features but {} centers and {} scales",
                schema.len(),
                center.len(),
                scale.len()
            )));
        }
        if center.iter().any(|c| !c.is_finite()) {
            return Err(invalid("non-finite center".to_string()));
        }
        if scale.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(invalid("scale must be finite and positive".to_string()));
        }

        Ok(Self {
            schema,
            center: Array1::from(center),
            scale: Array1::from(scale),
        })
    }

    /// Read a JSON scaler artifact
    pub fn load(path: &Path) -> Result<Self> {
        let doc: ScalerDocument = read_document(path, ArtifactKind::Scaler)?;
        check_version(doc.format_version, ArtifactKind::Scaler)?;
        Self::new(FeatureSchema::new(doc.features), doc.center, doc.scale)
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Scale one feature vector laid out as [`Self::schema`]
    pub fn transform(&self, features: &Array1<f64>) -> Result<Array1<f64>> {
        if features.len() != self.center.len() {
            return Err(SegmentError::DimensionMismatch {
                context: "scaler input",
                expected: self.center.len(),
                found: features.len(),
            });
        }
        Ok((features - &self.center) / &self.scale)
    }
}

/// Fixed set of centroids in scaled feature space, each tagged with a cluster id
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterModel {
    schema: FeatureSchema,
    /// Cluster ids, ascending; row `i` of `centroids` belongs to `ids[i]`
    ids: Vec<u32>,
    centroids: Array2<f64>,
}

impl ClusterModel {
    pub fn new(schema: FeatureSchema, centroids: Vec<(u32, Vec<f64>)>) -> Result<Self> {
        let invalid = |reason: String| SegmentError::InvalidArtifact {
            kind: ArtifactKind::ClusterModel,
            reason,
        };

        if centroids.is_empty() {
            return Err(invalid("no centroids".to_string()));
        }

        let mut centroids = centroids;
        centroids.sort_by_key(|(id, _)| *id);
        if let Some(pair) = centroids.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(invalid(format!("duplicate cluster id {}", pair[0].0)));
        }

        let dims = schema.len();
        let mut flat = Vec::with_capacity(centroids.len() * dims);
        for (id, center) in &centroids {
            if center.len() != dims {
                return Err(invalid(format!(
                    "centroid {id} has {} coordinates, expected {dims}",
                    center.len()
                )));
            }
            if center.iter().any(|v| !v.is_finite()) {
                return Err(invalid(format!("centroid {id} has non-finite coordinates")));
            }
            flat.extend_from_slice(center);
        }

        let ids = centroids.iter().map(|(id, _)| *id).collect::<Vec<_>>();
        let centroids = Array2::from_shape_vec((ids.len(), dims), flat)
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            schema,
            ids,
            centroids,
        })
    }

    /// Read a JSON cluster artifact
    pub fn load(path: &Path) -> Result<Self> {
        let doc: ClusterDocument = read_document(path, ArtifactKind::ClusterModel)?;
        check_version(doc.format_version, ArtifactKind::ClusterModel)?;
        let centroids = doc
            .centroids
            .into_iter()
            .map(|c| (c.id, c.center))
            .collect();
        Self::new(FeatureSchema::new(doc.features), centroids)
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Cluster ids the model can emit, ascending
    pub fn cluster_ids(&self) -> &[u32] {
        &self.ids
    }

    pub fn n_clusters(&self) -> usize {
        self.ids.len()
    }

    /// Centroid coordinates for a cluster id
    pub fn centroid(&self, cluster_id: u32) -> Option<ArrayView1<'_, f64>> {
        self.ids
            .binary_search(&cluster_id)
            .ok()
            .map(|row| self.centroids.row(row))
    }

    /// Id of the centroid nearest to `features` (Euclidean).
    ///
    /// Equidistant centroids resolve to the lowest cluster id.
    pub fn predict(&self, features: &Array1<f64>) -> Result<u32> {
        if features.len() != self.centroids.ncols() {
            return Err(SegmentError::DimensionMismatch {
                context: "cluster assignment",
                expected: self.centroids.ncols(),
                found: features.len(),
            });
        }

        let mut min_distance = f64::INFINITY;
        let mut closest_cluster = self.ids[0];

        // Rows are in ascending id order, so strict `<` keeps the lowest id on ties
        for (row, centroid) in self.centroids.outer_iter().enumerate() {
            let distance = squared_distance(&features.view(), &centroid);
            if distance < min_distance {
                min_distance = distance;
                closest_cluster = self.ids[row];
            }
        }

        Ok(closest_cluster)
    }
}

/// Both artifacts, loaded once and shared read-only by every batch
#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    pub scaler: ScalingModel,
    pub clusters: ClusterModel,
}

impl ModelArtifacts {
    /// Load both artifacts; any failure is fatal for the process.
    pub fn load(scaler_path: &Path, cluster_model_path: &Path) -> Result<Self> {
        let scaler = ScalingModel::load(scaler_path)?;
        let clusters = ClusterModel::load(cluster_model_path)?;

        info!(
            scaler = %scaler_path.display(),
            cluster_model = %cluster_model_path.display(),
            n_clusters = clusters.n_clusters(),
            "Model artifacts loaded"
        );

        Ok(Self { scaler, clusters })
    }
}

fn read_document<T: for<'de> Deserialize<'de>>(path: &Path, kind: ArtifactKind) -> Result<T> {
    let missing = |reason: String| SegmentError::MissingArtifact {
        kind,
        path: path.to_path_buf(),
        reason,
    };

    let raw = std::fs::read_to_string(path).map_err(|e| missing(e.to_string()))?;
    serde_json::from_str(&raw).map_err(|e| missing(format!("corrupt artifact: {e}")))
}

fn check_version(version: u32, kind: ArtifactKind) -> Result<()> {
    if version == ARTIFACT_FORMAT_VERSION {
        Ok(())
    } else {
        Err(SegmentError::InvalidArtifact {
            kind,
            reason: format!(
                "format version {version} is not supported (expected {ARTIFACT_FORMAT_VERSION})"
            ),
        })
    }
}

/// Squared Euclidean distance; ordering is the same as for the plain distance
fn squared_distance(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}
