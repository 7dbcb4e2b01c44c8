//! Batch separation in a PCA embedding.
//!
//! Samples are projected onto the leading principal components, every batch
//! is reduced to its centroid, and the separation score is the sum of the
//! distances between all centroid pairs. Larger scores mean batches sit
//! further apart.

use log::debug;
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::batch::{BatchDesign, BatchLabels};
use crate::dense::ExpressionMatrix;
use crate::dimred::pca::{PCABuilder, SVDMethod};
use crate::error::{CombatError, Result};
use crate::similarity::pairwise_distance_sum;
use crate::utils::BatchIdentifier;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationParams {
    /// Embedding dimension, clamped to the matrix shape.
    pub n_components: usize,
    pub random_seed: u64,
    pub svd_method: SVDMethod,
}

impl Default for EvaluationParams {
    fn default() -> Self {
        Self {
            n_components: 2,
            random_seed: 4711,
            svd_method: SVDMethod::Exact,
        }
    }
}

/// Separation score together with the embedding it was computed from.
#[derive(Debug, Clone)]
pub struct BatchSeparation<B: BatchIdentifier> {
    score: f64,
    batches: Vec<B>,
    centroids: Array2<f64>,
    embedding: Array2<f64>,
}

impl<B: BatchIdentifier> BatchSeparation<B> {
    /// Sum of pairwise centroid distances.
    pub fn score(&self) -> f64 {
        self.score
    }

    /// Batches in the row order of [`BatchSeparation::centroids`].
    pub fn batches(&self) -> &[B] {
        &self.batches
    }

    /// One row per batch.
    pub fn centroids(&self) -> &Array2<f64> {
        &self.centroids
    }

    /// Projected samples, samples × components.
    pub fn embedding(&self) -> &Array2<f64> {
        &self.embedding
    }
}

#[derive(Debug, Clone, Default)]
pub struct SeparationEvaluator {
    params: EvaluationParams,
}

impl SeparationEvaluator {
    pub fn new(params: EvaluationParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &EvaluationParams {
        &self.params
    }

    /// Scores a samples × features matrix with one batch label per row.
    pub fn separation<B: BatchIdentifier>(
        &self,
        samples_by_features: ArrayView2<f64>,
        batches: &[B],
    ) -> Result<BatchSeparation<B>> {
        let (n_samples, n_features) = samples_by_features.dim();
        if batches.len() != n_samples {
            return Err(CombatError::configuration(format!(
                "{} batch labels for {} samples",
                batches.len(),
                n_samples
            )));
        }
        if self.params.n_components == 0 {
            return Err(CombatError::configuration(
                "n_components must be at least 1",
            ));
        }
        let design = BatchDesign::new(batches);
        if design.n_batches() < 2 {
            return Err(CombatError::configuration(format!(
                "separation needs at least 2 batches, found {}",
                design.n_batches()
            )));
        }

        let n_components = self.params.n_components.min(n_samples).min(n_features);
        let mut pca = PCABuilder::new()
            .n_components(n_components)
            .svd_method(self.params.svd_method)
            .random_seed(self.params.random_seed)
            .build();
        let embedding = pca.fit_transform(samples_by_features)?;

        let mut centroids = Array2::zeros((design.n_batches(), n_components));
        for (b, members) in design.members().iter().enumerate() {
            let centroid = embedding
                .select(Axis(0), members)
                .mean_axis(Axis(0))
                .ok_or_else(|| CombatError::configuration("empty batch"))?;
            centroids.row_mut(b).assign(&centroid);
        }
        let score = pairwise_distance_sum(centroids.view());
        debug!(
            "separation of {} batches over {} components: {:.4}",
            design.n_batches(),
            n_components,
            score
        );

        Ok(BatchSeparation {
            score,
            batches: design.batches().to_vec(),
            centroids,
            embedding,
        })
    }

    /// Scores a features × samples matrix, matching labels by sample id.
    pub fn score_matrix(
        &self,
        matrix: &ExpressionMatrix,
        labels: &BatchLabels,
    ) -> Result<BatchSeparation<String>> {
        let aligned = labels.align(matrix.sample_ids())?;
        self.separation(matrix.samples_by_features().view(), &aligned)
    }
}
