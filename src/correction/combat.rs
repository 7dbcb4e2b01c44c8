//! # ComBat
//!
//! Parametric empirical-Bayes location/scale batch adjustment
//! (Johnson, Li & Rabinovic 2007) for a features × samples matrix.
//!
//! 1. Standardize every feature by its grand mean and pooled deviation
//! 2. Estimate per-batch location (γ̂) and scale (δ̂²) of every feature
//! 3. Fit a Normal prior on γ and an Inverse-Gamma prior on δ² per batch,
//!    across features, by method of moments
//! 4. Shrink γ̂, δ̂² toward the batch prior with a fixed-point iteration
//! 5. Adjust, `(s - γ*) / δ*`, and undo the standardization

use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::batch::{BatchDesign, BatchLabels};
use crate::correction::{BatchCorrection, Diagnostic};
use crate::dense::ExpressionMatrix;
use crate::error::{CombatError, Result};
use crate::statistics::{gather, mean, subset_mean, variance};
use crate::utils::{BatchIdentifier, VARIANCE_FLOOR};

/// Deviation used to standardize each feature before estimating batch
/// effects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Standardization {
    /// Pooled within-batch deviation, `Σ (x - batch mean)² / (N - B)`.
    #[default]
    Pooled,
    /// Overall deviation around the grand mean, `Σ (x - mean)² / (N - 1)`.
    Overall,
}

/// Tuning values of the ComBat fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatParams {
    /// Shrinkage stops once the largest relative change of γ and δ² drops
    /// below this value.
    pub convergence_threshold: f64,
    pub max_iterations: usize,
    /// Smallest accepted batch. Values below 2 are rejected since a batch
    /// variance needs two samples.
    pub min_batch_size: usize,
    pub standardization: Standardization,
}

impl Default for CombatParams {
    fn default() -> Self {
        Self {
            convergence_threshold: 1e-4,
            max_iterations: 50,
            min_batch_size: 2,
            standardization: Standardization::Pooled,
        }
    }
}

impl CombatParams {
    pub fn check(&self) -> Result<()> {
        if !(self.convergence_threshold.is_finite() && self.convergence_threshold > 0.0) {
            return Err(CombatError::configuration(format!(
                "convergence threshold must be positive, got {}",
                self.convergence_threshold
            )));
        }
        if self.max_iterations == 0 {
            return Err(CombatError::configuration(
                "max_iterations must be at least 1",
            ));
        }
        if self.min_batch_size < 2 {
            return Err(CombatError::configuration(format!(
                "min_batch_size must be at least 2, got {}",
                self.min_batch_size
            )));
        }
        Ok(())
    }
}

/// Prior on the batch scale parameter δ².
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalePrior {
    InverseGamma { a: f64, b: f64 },
    /// All features share one δ̂²; limit of the Inverse-Gamma as its
    /// variance goes to zero.
    PointMass(f64),
}

/// Empirical-Bayes prior of one batch, estimated across features.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchPrior {
    pub gamma_bar: f64,
    pub tau2: f64,
    pub scale: ScalePrior,
}

impl BatchPrior {
    /// Method-of-moments fit from the per-feature estimates of one batch.
    /// `None` with fewer than two features.
    pub fn estimate(gamma_hat: &[f64], delta_hat: &[f64]) -> Option<Self> {
        let tau2 = variance(gamma_hat, 1)?;
        let s2 = variance(delta_hat, 1)?;
        let m = mean(delta_hat);

        let scale = if s2 <= VARIANCE_FLOOR {
            ScalePrior::PointMass(m)
        } else {
            ScalePrior::InverseGamma {
                a: (2.0 * s2 + m * m) / s2,
                b: (m * s2 + m * m * m) / s2,
            }
        };

        Some(Self {
            gamma_bar: mean(gamma_hat),
            tau2,
            scale,
        })
    }

    /// Posterior mean of γ given the current δ².
    fn posterior_location(&self, gamma_hat: f64, delta2: f64, n: f64) -> f64 {
        (self.tau2 * n * gamma_hat + delta2 * self.gamma_bar) / (self.tau2 * n + delta2)
    }

    /// Posterior mean of δ² given the sum of squared residuals.
    fn posterior_scale(&self, sum2: f64, n: f64) -> f64 {
        match self.scale {
            ScalePrior::InverseGamma { a, b } => (0.5 * sum2 + b) / (n / 2.0 + a - 1.0),
            ScalePrior::PointMass(m) => m,
        }
    }
}

struct Shrunk {
    gamma: f64,
    delta2: f64,
    change: f64,
    converged: bool,
}

fn relative_change(new: f64, old: f64) -> f64 {
    let diff = (new - old).abs();
    if old.abs() > VARIANCE_FLOOR {
        diff / old.abs()
    } else {
        diff
    }
}

/// Fixed-point iteration of the posterior means for one feature of one
/// batch. `values` are the standardized values of the batch members.
fn shrink(
    values: &[f64],
    gamma_hat: f64,
    delta_hat: f64,
    prior: &BatchPrior,
    params: &CombatParams,
) -> Shrunk {
    let n = values.len() as f64;
    let mut gamma = gamma_hat;
    let mut delta2 = delta_hat;
    let mut change = f64::INFINITY;

    for _ in 0..params.max_iterations {
        let gamma_new = prior.posterior_location(gamma_hat, delta2, n);
        let sum2: f64 = values.iter().map(|&s| (s - gamma_new).powi(2)).sum();
        let delta_new = prior.posterior_scale(sum2, n);

        change = relative_change(gamma_new, gamma).max(relative_change(delta_new, delta2));
        gamma = gamma_new;
        delta2 = delta_new;

        if change < params.convergence_threshold {
            return Shrunk {
                gamma,
                delta2,
                change,
                converged: true,
            };
        }
    }

    Shrunk {
        gamma,
        delta2,
        change,
        converged: false,
    }
}

#[derive(Debug, Clone)]
struct FittedModel {
    assignment: Vec<usize>,
    grand_mean: Array1<f64>,
    std_dev: Array1<f64>,
    /// batches × features
    gamma_star: Array2<f64>,
    delta_star: Array2<f64>,
    passthrough: Vec<bool>,
    priors: Vec<Option<BatchPrior>>,
}

/// ComBat batch corrector.
///
/// ```ignore
/// let mut combat = Combat::new(CombatParams::default());
/// let corrected = combat.fit_transform(data.view(), &batches)?;
/// for warning in combat.diagnostics() { ... }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Combat {
    params: CombatParams,
    model: Option<FittedModel>,
    diagnostics: Vec<Diagnostic>,
}

impl Combat {
    pub fn new(params: CombatParams) -> Self {
        Self {
            params,
            model: None,
            diagnostics: Vec::new(),
        }
    }

    pub fn params(&self) -> &CombatParams {
        &self.params
    }

    pub fn is_fitted(&self) -> bool {
        self.model.is_some()
    }

    /// Shrunk batch locations, batches × features.
    pub fn gamma_star(&self) -> Option<ArrayView2<'_, f64>> {
        self.model.as_ref().map(|m| m.gamma_star.view())
    }

    /// Shrunk batch scales, batches × features.
    pub fn delta_star(&self) -> Option<ArrayView2<'_, f64>> {
        self.model.as_ref().map(|m| m.delta_star.view())
    }

    /// Per-batch priors in sorted batch order; `None` where no prior could
    /// be estimated.
    pub fn priors(&self) -> Option<&[Option<BatchPrior>]> {
        self.model.as_ref().map(|m| m.priors.as_slice())
    }

    /// Corrects a labelled matrix. Labels are matched to the columns by
    /// sample identifier.
    pub fn correct(
        &mut self,
        matrix: &ExpressionMatrix,
        labels: &BatchLabels,
    ) -> Result<ExpressionMatrix> {
        let aligned = labels.align(matrix.sample_ids())?;
        let corrected = self.fit_transform(matrix.values(), &aligned)?;
        matrix.with_values(corrected)
    }

    fn raise(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    fn check_input<B: BatchIdentifier>(data: ArrayView2<f64>, batches: &[B]) -> Result<()> {
        let (n_features, n_samples) = data.dim();
        if n_features == 0 {
            return Err(CombatError::configuration(
                "expression matrix has no feature rows",
            ));
        }
        if n_samples < 2 {
            return Err(CombatError::configuration(format!(
                "expression matrix has {} sample column(s), at least 2 required",
                n_samples
            )));
        }
        if batches.len() != n_samples {
            return Err(CombatError::configuration(format!(
                "{} batch labels for {} sample columns",
                batches.len(),
                n_samples
            )));
        }
        if let Some(((g, j), v)) = data.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(CombatError::input(format!(
                "non-finite value {} at feature {}, sample {}",
                v, g, j
            )));
        }
        Ok(())
    }

    /// Grand mean and standardizing deviation of one feature. The deviation
    /// is `None` when the feature has no variance.
    fn location_scale<B: BatchIdentifier>(
        &self,
        row: ndarray::ArrayView1<f64>,
        design: &BatchDesign<B>,
    ) -> (f64, Option<f64>) {
        let n = row.len() as f64;
        let grand_mean = row.sum() / n;
        let var = match self.params.standardization {
            Standardization::Pooled => {
                let batch_means: Vec<f64> = design
                    .members()
                    .iter()
                    .map(|m| subset_mean(row, m))
                    .collect();
                let ss: f64 = row
                    .iter()
                    .zip(design.assignment())
                    .map(|(&x, &b)| (x - batch_means[b]).powi(2))
                    .sum();
                ss / (n - design.n_batches() as f64)
            }
            Standardization::Overall => {
                row.iter().map(|&x| (x - grand_mean).powi(2)).sum::<f64>() / (n - 1.0)
            }
        };

        if var <= VARIANCE_FLOOR * (1.0 + grand_mean * grand_mean) {
            (grand_mean, None)
        } else {
            (grand_mean, Some(var.sqrt()))
        }
    }
}

impl BatchCorrection for Combat {
    fn fit<B: BatchIdentifier>(&mut self, data: ArrayView2<f64>, batches: &[B]) -> Result<()> {
        self.model = None;
        self.diagnostics.clear();

        self.params.check()?;
        Self::check_input(data, batches)?;
        let design = BatchDesign::new(batches);
        design.validate(self.params.min_batch_size)?;

        let (n_features, n_samples) = data.dim();
        let n_batches = design.n_batches();
        let names: Vec<String> = design.batches().iter().map(|b| b.to_string()).collect();

        // Standardize
        let mut grand_mean = Array1::zeros(n_features);
        let mut std_dev = Array1::ones(n_features);
        let mut passthrough = vec![false; n_features];
        let mut standardized = Array2::zeros((n_features, n_samples));
        for (g, row) in data.rows().into_iter().enumerate() {
            let (mu, sd) = self.location_scale(row, &design);
            grand_mean[g] = mu;
            match sd {
                Some(sd) => {
                    std_dev[g] = sd;
                    standardized
                        .row_mut(g)
                        .assign(&row.mapv(|x| (x - mu) / sd));
                }
                None => {
                    passthrough[g] = true;
                    self.raise(Diagnostic::ZeroVariance {
                        feature: g,
                        batch: None,
                    });
                }
            }
        }

        // Per-batch location and scale estimates
        let mut gamma_hat = Array2::zeros((n_batches, n_features));
        let mut delta_hat = Array2::ones((n_batches, n_features));
        for g in 0..n_features {
            if passthrough[g] {
                continue;
            }
            let row = standardized.row(g);
            for (b, members) in design.members().iter().enumerate() {
                let values = gather(row, members);
                let var = variance(&values, 1).unwrap_or(0.0);
                if var <= VARIANCE_FLOOR {
                    passthrough[g] = true;
                    self.raise(Diagnostic::ZeroVariance {
                        feature: g,
                        batch: Some(names[b].clone()),
                    });
                    break;
                }
                gamma_hat[[b, g]] = mean(&values);
                delta_hat[[b, g]] = var;
            }
        }

        let n_passthrough = passthrough.iter().filter(|&&p| p).count();
        if n_passthrough > 0 {
            warn!(
                "{} of {} feature(s) have zero variance and are passed through uncorrected",
                n_passthrough, n_features
            );
        }
        let usable: Vec<usize> = (0..n_features).filter(|&g| !passthrough[g]).collect();

        // Empirical-Bayes priors and shrinkage
        let mut gamma_star = gamma_hat.clone();
        let mut delta_star = delta_hat.clone();
        let mut priors = Vec::with_capacity(n_batches);
        for (b, members) in design.members().iter().enumerate() {
            let gh: Vec<f64> = usable.iter().map(|&g| gamma_hat[[b, g]]).collect();
            let dh: Vec<f64> = usable.iter().map(|&g| delta_hat[[b, g]]).collect();

            let Some(prior) = BatchPrior::estimate(&gh, &dh) else {
                let diagnostic = Diagnostic::DegeneratePrior {
                    batch: names[b].clone(),
                    reason: format!("{} usable feature(s), at least 2 required", usable.len()),
                };
                warn!("{}", diagnostic);
                self.raise(diagnostic);
                priors.push(None);
                continue;
            };
            debug!(
                "batch '{}': gamma_bar = {:.4}, tau2 = {:.4}, scale prior = {:?}",
                names[b], prior.gamma_bar, prior.tau2, prior.scale
            );

            let mut not_converged = 0usize;
            let mut worst_change = 0.0f64;
            for &g in &usable {
                let values = gather(standardized.row(g), members);
                let shrunk = shrink(
                    &values,
                    gamma_hat[[b, g]],
                    delta_hat[[b, g]],
                    &prior,
                    &self.params,
                );
                if !shrunk.converged {
                    not_converged += 1;
                    worst_change = worst_change.max(shrunk.change);
                }
                gamma_star[[b, g]] = shrunk.gamma;
                delta_star[[b, g]] = shrunk.delta2;
            }

            if not_converged > 0 {
                let diagnostic = Diagnostic::NotConverged {
                    batch: names[b].clone(),
                    features: not_converged,
                    max_change: worst_change,
                };
                warn!("{}", diagnostic);
                self.raise(diagnostic);
            }
            priors.push(Some(prior));
        }

        self.model = Some(FittedModel {
            assignment: design.assignment().to_vec(),
            grand_mean,
            std_dev,
            gamma_star,
            delta_star,
            passthrough,
            priors,
        });
        Ok(())
    }

    fn transform(&self, data: ArrayView2<f64>) -> Result<Array2<f64>> {
        let model = self.model.as_ref().ok_or(CombatError::NotFitted)?;
        let expected = (model.grand_mean.len(), model.assignment.len());
        if data.dim() != expected {
            return Err(CombatError::DimensionMismatch {
                expected: format!("{:?}", expected),
                got: format!("{:?}", data.dim()),
            });
        }

        let mut corrected = data.to_owned();
        for (g, mut row) in corrected.rows_mut().into_iter().enumerate() {
            if model.passthrough[g] {
                continue;
            }
            let (mu, sd) = (model.grand_mean[g], model.std_dev[g]);
            for (x, &b) in row.iter_mut().zip(&model.assignment) {
                let s = (*x - mu) / sd;
                let adjusted = (s - model.gamma_star[[b, g]]) / model.delta_star[[b, g]].sqrt();
                *x = adjusted * sd + mu;
            }
        }
        Ok(corrected)
    }

    fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}
