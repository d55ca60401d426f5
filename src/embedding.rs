//! Embedding and clustering collaborators
//!
//! The pipeline only needs two things from machine learning: a low-dimensional
//! projection of the units, and a cluster label per unit. Both are traits so
//! callers can plug in their own manifold learner or clustering; the default
//! adapters wrap aprender:
//! - `StandardScaler` for feature standardization
//! - `PCA` for the 2-D embedding
//! - `KMeans` and `DBSCAN` for stratification (DBSCAN noise is label -1)
//!
//! aprender works in `f32`; rows are converted at this boundary and come back
//! as `f64`.

use crate::error::{check_finite, Result, VaineError};
use aprender::cluster::{KMeans, DBSCAN};
use aprender::preprocessing::{StandardScaler, PCA};
use aprender::primitives::Matrix;
use aprender::traits::{Transformer, UnsupervisedEstimator};

/// Projects row-major features into a low-dimensional embedding
pub trait Embedder {
    /// One output row per input row
    ///
    /// # Errors
    /// `EmbeddingError` when the projection cannot be computed.
    fn fit_transform(&self, features: &[Vec<f64>], seed: u64) -> Result<Vec<Vec<f64>>>;
}

/// Assigns an integer cluster label to each row
pub trait Clusterer {
    /// # Errors
    /// `ClusteringError` when the clustering cannot be computed.
    fn fit_predict(&self, embedding: &[Vec<f64>], seed: u64) -> Result<Vec<i64>>;
}

fn check_rectangular(rows: &[Vec<f64>], required: usize) -> Result<usize> {
    if rows.len() < required {
        return Err(VaineError::InsufficientData {
            required,
            actual: rows.len(),
        });
    }
    let width = rows[0].len();
    if let Some(row) = rows.iter().find(|r| r.len() != width) {
        return Err(VaineError::ShapeMismatch {
            expected: width,
            actual: row.len(),
        });
    }
    check_finite(rows)?;
    Ok(width)
}

fn to_matrix(rows: &[Vec<f64>], width: usize) -> std::result::Result<Matrix<f32>, String> {
    let data: Vec<f32> = rows.iter().flatten().map(|&v| v as f32).collect();
    Matrix::from_vec(rows.len(), width, data).map_err(|e| e.to_string())
}

fn from_matrix(matrix: &Matrix<f32>) -> Vec<Vec<f64>> {
    let (n_rows, n_cols) = matrix.shape();
    (0..n_rows)
        .map(|i| (0..n_cols).map(|j| matrix.get(i, j) as f64).collect())
        .collect()
}

/// Zero-mean, unit-variance columns (population standard deviation)
///
/// Constant columns come out as all zeros.
///
/// # Errors
/// `InsufficientData` for an empty input, `ShapeMismatch` for ragged rows,
/// `NonFiniteFeature` for a missing (NaN) or infinite cell, `EmbeddingError`
/// when the scaler fails.
pub fn standardize(features: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    let width = check_rectangular(features, 1)?;
    if width == 0 {
        return Ok(features.to_vec());
    }
    let matrix = to_matrix(features, width).map_err(VaineError::EmbeddingError)?;

    let mut scaler = StandardScaler::new().with_mean(true).with_std(true);
    scaler
        .fit(&matrix)
        .map_err(|e| VaineError::EmbeddingError(e.to_string()))?;
    let scaled = scaler
        .transform(&matrix)
        .map_err(|e| VaineError::EmbeddingError(e.to_string()))?;

    let mut rows = from_matrix(&scaled);
    for v in rows.iter_mut().flatten() {
        if !v.is_finite() {
            *v = 0.0;
        }
    }
    Ok(rows)
}

/// Principal-component projection
///
/// Inputs that are already no wider than `n_components` are returned as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcaEmbedder {
    pub n_components: usize,
}

impl Default for PcaEmbedder {
    fn default() -> Self {
        Self { n_components: 2 }
    }
}

impl Embedder for PcaEmbedder {
    fn fit_transform(&self, features: &[Vec<f64>], _seed: u64) -> Result<Vec<Vec<f64>>> {
        let width = check_rectangular(features, 2)?;
        if width <= self.n_components {
            return Ok(features.to_vec());
        }

        let components = self.n_components.min(features.len());
        let matrix = to_matrix(features, width).map_err(VaineError::EmbeddingError)?;
        let mut pca = PCA::new(components);
        let reduced = pca
            .fit_transform(&matrix)
            .map_err(|e| VaineError::EmbeddingError(e.to_string()))?;

        tracing::debug!(
            "PCA reduced {} features to {} components",
            width,
            components
        );
        Ok(from_matrix(&reduced))
    }
}

/// Uses the features unchanged as the embedding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassthroughEmbedder;

impl Embedder for PassthroughEmbedder {
    fn fit_transform(&self, features: &[Vec<f64>], _seed: u64) -> Result<Vec<Vec<f64>>> {
        check_rectangular(features, 1)?;
        Ok(features.to_vec())
    }
}

/// k-means with an explicit random state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KMeansClusterer {
    pub n_clusters: usize,
}

impl Default for KMeansClusterer {
    fn default() -> Self {
        Self { n_clusters: 8 }
    }
}

impl Clusterer for KMeansClusterer {
    fn fit_predict(&self, embedding: &[Vec<f64>], seed: u64) -> Result<Vec<i64>> {
        let width = check_rectangular(embedding, 1)?;
        if self.n_clusters == 0 {
            return Err(VaineError::ClusteringError(
                "n_clusters must be at least 1".to_string(),
            ));
        }

        let k = self.n_clusters.min(embedding.len());
        if k < self.n_clusters {
            tracing::warn!(
                "only {} units; reducing k-means clusters from {} to {}",
                embedding.len(),
                self.n_clusters,
                k
            );
        }

        let matrix = to_matrix(embedding, width).map_err(VaineError::ClusteringError)?;
        let mut kmeans = KMeans::new(k).with_random_state(seed);
        kmeans
            .fit(&matrix)
            .map_err(|e| VaineError::ClusteringError(e.to_string()))?;

        Ok(kmeans
            .predict(&matrix)
            .into_iter()
            .map(|l| l as i64)
            .collect())
    }
}

/// Density-based clustering; unreachable points get the noise label -1
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DbscanClusterer {
    pub eps: f64,
    pub min_samples: usize,
}

impl Default for DbscanClusterer {
    fn default() -> Self {
        Self {
            eps: 0.5,
            min_samples: 5,
        }
    }
}

impl Clusterer for DbscanClusterer {
    fn fit_predict(&self, embedding: &[Vec<f64>], _seed: u64) -> Result<Vec<i64>> {
        let width = check_rectangular(embedding, 1)?;
        let matrix = to_matrix(embedding, width).map_err(VaineError::ClusteringError)?;

        let mut dbscan = DBSCAN::new(self.eps as f32, self.min_samples);
        dbscan
            .fit(&matrix)
            .map_err(|e| VaineError::ClusteringError(e.to_string()))?;

        let labels: Vec<i64> = dbscan.labels().iter().map(|&l| l as i64).collect();
        let n_noise = labels.iter().filter(|&&l| l < 0).count();
        if n_noise > 0 {
            tracing::debug!("DBSCAN left {} of {} units as noise", n_noise, labels.len());
        }
        Ok(labels)
    }
}
