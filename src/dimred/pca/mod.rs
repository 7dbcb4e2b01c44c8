use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{CombatError, Result};
use crate::svd;

/// SVD algorithm backing the PCA fit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SVDMethod {
    #[default]
    Exact,
    Randomized {
        n_oversamples: usize,
        n_power_iterations: usize,
    },
}

pub struct PCABuilder {
    n_components: Option<usize>,
    center: bool,
    svd_method: SVDMethod,
    random_seed: u64,
}

impl Default for PCABuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PCABuilder {
    pub fn new() -> Self {
        PCABuilder {
            n_components: None,
            center: true,
            svd_method: SVDMethod::Exact,
            random_seed: 42,
        }
    }

    pub fn n_components(mut self, n_components: usize) -> Self {
        self.n_components = Some(n_components);
        self
    }

    pub fn center(mut self, center: bool) -> Self {
        self.center = center;
        self
    }

    pub fn svd_method(mut self, svd_method: SVDMethod) -> Self {
        self.svd_method = svd_method;
        self
    }

    /// Seed for the randomized solver; the exact solver ignores it.
    pub fn random_seed(mut self, random_seed: u64) -> Self {
        self.random_seed = random_seed;
        self
    }

    pub fn build(self) -> PCA {
        PCA {
            n_components: self.n_components,
            center: self.center,
            svd_method: self.svd_method,
            random_seed: self.random_seed,
            components: None,
            mean: None,
            explained_variance: None,
            total_variance: None,
        }
    }
}

/// Principal component analysis of a dense samples × features matrix.
pub struct PCA {
    n_components: Option<usize>,
    center: bool,
    svd_method: SVDMethod,
    random_seed: u64,
    components: Option<Array2<f64>>,
    mean: Option<Array1<f64>>,
    explained_variance: Option<Array1<f64>>,
    total_variance: Option<f64>,
}

impl PCA {
    pub fn fit(&mut self, x: ArrayView2<f64>) -> Result<()> {
        let (n_samples, n_features) = x.dim();
        if n_samples < 2 || n_features == 0 {
            return Err(CombatError::configuration(format!(
                "PCA needs at least 2 samples and 1 feature, got {}x{}",
                n_samples, n_features
            )));
        }
        let n_components = self
            .n_components
            .unwrap_or_else(|| n_samples.min(n_features));

        let mean = if self.center {
            x.mean_axis(Axis(0))
                .ok_or_else(|| CombatError::configuration("cannot center an empty matrix"))?
        } else {
            Array1::zeros(n_features)
        };
        let x_centered = &x - &mean;

        let decomposition = match self.svd_method {
            SVDMethod::Exact => svd::exact(x_centered.view(), n_components)?,
            SVDMethod::Randomized {
                n_oversamples,
                n_power_iterations,
            } => svd::randomized(
                x_centered.view(),
                n_components,
                n_oversamples,
                n_power_iterations,
                self.random_seed,
            )?,
        };

        let dof = (n_samples - 1) as f64;
        let total_variance = x_centered.iter().map(|v| v * v).sum::<f64>() / dof;
        self.explained_variance = Some(decomposition.s().mapv(|s| s * s / dof));
        self.total_variance = Some(total_variance);
        self.components = Some(decomposition.vt().clone());
        self.mean = Some(mean);

        Ok(())
    }

    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        let (components, mean) = match (&self.components, &self.mean) {
            (Some(c), Some(m)) => (c, m),
            _ => return Err(CombatError::NotFitted),
        };
        if x.ncols() != components.ncols() {
            return Err(CombatError::DimensionMismatch {
                expected: format!("{} features", components.ncols()),
                got: format!("{} features", x.ncols()),
            });
        }
        Ok((&x - mean).dot(&components.t()))
    }

    pub fn fit_transform(&mut self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }

    /// Principal axes, n_components × n_features.
    pub fn components(&self) -> Option<&Array2<f64>> {
        self.components.as_ref()
    }

    pub fn explained_variance(&self) -> Option<&Array1<f64>> {
        self.explained_variance.as_ref()
    }

    /// Share of the total variance carried by each component.
    pub fn explained_variance_ratio(&self) -> Option<Array1<f64>> {
        let ev = self.explained_variance.as_ref()?;
        let total = self.total_variance?;
        if total > 0.0 {
            Some(ev / total)
        } else {
            Some(Array1::zeros(ev.len()))
        }
    }

    pub fn total_variance(&self) -> Option<f64> {
        self.total_variance
    }
}
