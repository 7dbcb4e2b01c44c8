use std::fmt;

use ndarray::{Array2, ArrayView2};

use crate::error::Result;
use crate::utils::BatchIdentifier;

pub mod combat;

pub use combat::{Combat, CombatParams, Standardization};

/// Core trait for batch correction algorithms.
///
/// Data is laid out features × samples; `batches` holds one label per
/// sample column.
pub trait BatchCorrection {
    /// Fit the correction model to the data and batches
    fn fit<B: BatchIdentifier>(&mut self, data: ArrayView2<f64>, batches: &[B]) -> Result<()>;

    /// Apply correction to data using a previously fitted model
    fn transform(&self, data: ArrayView2<f64>) -> Result<Array2<f64>>;

    /// Fit the model and transform the data in a single operation
    fn fit_transform<B: BatchIdentifier>(
        &mut self,
        data: ArrayView2<f64>,
        batches: &[B],
    ) -> Result<Array2<f64>> {
        self.fit(data, batches)?;
        self.transform(data)
    }

    /// Non-fatal numerical warnings raised by the last fit.
    fn diagnostics(&self) -> &[Diagnostic];
}

/// Numerical instability warning. Never aborts a correction; each one has a
/// fallback that is applied instead.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// The feature has zero variance overall or inside a batch and is passed
    /// through uncorrected.
    ZeroVariance {
        feature: usize,
        batch: Option<String>,
    },
    /// The batch prior could not be estimated; raw per-feature estimates
    /// were used without shrinkage.
    DegeneratePrior { batch: String, reason: String },
    /// Shrinkage hit the iteration cap for `features` features of `batch`;
    /// the last estimates were kept.
    NotConverged {
        batch: String,
        features: usize,
        max_change: f64,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::ZeroVariance {
                feature,
                batch: Some(batch),
            } => write!(
                f,
                "feature {} has zero variance in batch '{}', passed through uncorrected",
                feature, batch
            ),
            Diagnostic::ZeroVariance {
                feature,
                batch: None,
            } => write!(
                f,
                "feature {} has zero variance, passed through uncorrected",
                feature
            ),
            Diagnostic::DegeneratePrior { batch, reason } => write!(
                f,
                "no prior for batch '{}' ({}), shrinkage skipped",
                batch, reason
            ),
            Diagnostic::NotConverged {
                batch,
                features,
                max_change,
            } => write!(
                f,
                "shrinkage for batch '{}' did not converge for {} feature(s), last relative change {:.3e}",
                batch, features, max_change
            ),
        }
    }
}
