//! Synthetic expression data with known batch effects.

use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use crate::batch::BatchLabels;
use crate::dense::ExpressionMatrix;
use crate::error::{CombatError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub n_features: usize,
    pub cells_per_batch: Vec<usize>,
    /// Additive shift of every feature in each batch.
    pub batch_offsets: Vec<f64>,
    /// Noise multiplier of each batch.
    pub batch_scales: Vec<f64>,
    /// Standard deviation of the per-feature deviation from the batch shift.
    pub offset_jitter: f64,
    /// Feature baselines are drawn uniformly from this range.
    pub baseline_range: (f64, f64),
    pub noise_sd: f64,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            n_features: 40,
            cells_per_batch: vec![20, 20],
            batch_offsets: vec![0.0, 3.0],
            batch_scales: vec![1.0, 1.0],
            offset_jitter: 0.3,
            baseline_range: (5.0, 15.0),
            noise_sd: 1.0,
            seed: 42,
        }
    }
}

fn normal(sd: f64) -> Result<Normal<f64>> {
    if !(sd.is_finite() && sd >= 0.0) {
        return Err(CombatError::configuration(format!(
            "standard deviation must be finite and non-negative, got {}",
            sd
        )));
    }
    Normal::new(0.0, sd)
        .map_err(|e| CombatError::configuration(format!("invalid standard deviation {}: {}", sd, e)))
}

/// Generates `baseline + batch shift + scale · noise` for every feature and
/// cell. Cells are ordered batch by batch; cell `i` of batch `b` is named
/// `cell{b}_{i}` and labelled `batch{b}`.
pub fn simulate_batches(config: &SimulationConfig) -> Result<(ExpressionMatrix, BatchLabels)> {
    let n_batches = config.cells_per_batch.len();
    if config.batch_offsets.len() != n_batches || config.batch_scales.len() != n_batches {
        return Err(CombatError::configuration(format!(
            "{} batch sizes, {} offsets and {} scales",
            n_batches,
            config.batch_offsets.len(),
            config.batch_scales.len()
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let jitter = normal(config.offset_jitter)?;
    let noise = normal(config.noise_sd)?;

    let (lo, hi) = config.baseline_range;
    let baseline: Vec<f64> = (0..config.n_features)
        .map(|_| if hi > lo { rng.random_range(lo..hi) } else { lo })
        .collect();

    let n_cells: usize = config.cells_per_batch.iter().sum();
    let mut values = Array2::zeros((config.n_features, n_cells));
    let mut sample_ids = Vec::with_capacity(n_cells);
    let mut labels = Vec::with_capacity(n_cells);

    let mut col = 0;
    for (b, &n) in config.cells_per_batch.iter().enumerate() {
        let shift: Vec<f64> = (0..config.n_features)
            .map(|_| config.batch_offsets[b] + jitter.sample(&mut rng))
            .collect();
        for i in 0..n {
            for g in 0..config.n_features {
                values[[g, col]] =
                    baseline[g] + shift[g] + config.batch_scales[b] * noise.sample(&mut rng);
            }
            sample_ids.push(format!("cell{}_{}", b, i));
            labels.push(format!("batch{}", b));
            col += 1;
        }
    }

    let feature_ids = (0..config.n_features).map(|g| format!("gene{}", g)).collect();
    let matrix = ExpressionMatrix::new(values, feature_ids, sample_ids.clone())?;
    let labels = BatchLabels::new(sample_ids, labels)?;
    Ok((matrix, labels))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_and_labels() {
        let config = SimulationConfig {
            n_features: 5,
            cells_per_batch: vec![3, 4],
            ..SimulationConfig::default()
        };
        let (matrix, labels) = simulate_batches(&config).unwrap();
        assert_eq!(matrix.shape(), (5, 7));
        assert_eq!(labels.len(), 7);
        assert_eq!(labels.get("cell1_3"), Some("batch1"));
        assert_eq!(labels.distinct(), vec!["batch0", "batch1"]);
    }

    #[test]
    fn test_seed_reproducibility() {
        let config = SimulationConfig::default();
        let (a, _) = simulate_batches(&config).unwrap();
        let (b, _) = simulate_batches(&config).unwrap();
        assert_eq!(a, b);

        let (c, _) = simulate_batches(&SimulationConfig {
            seed: 7,
            ..config
        })
        .unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_offsets_show_in_batch_means() {
        let config = SimulationConfig {
            n_features: 10,
            cells_per_batch: vec![50, 50],
            batch_offsets: vec![0.0, 10.0],
            ..SimulationConfig::default()
        };
        let (matrix, _) = simulate_batches(&config).unwrap();
        let values = matrix.values();
        let first = values.slice(ndarray::s![.., ..50]).mean().unwrap();
        let second = values.slice(ndarray::s![.., 50..]).mean().unwrap();
        assert!((second - first - 10.0).abs() < 1.0);
    }

    #[test]
    fn test_invalid_config() {
        let config = SimulationConfig {
            batch_scales: vec![1.0],
            ..SimulationConfig::default()
        };
        assert!(simulate_batches(&config).unwrap_err().is_configuration());

        let config = SimulationConfig {
            noise_sd: -1.0,
            ..SimulationConfig::default()
        };
        assert!(simulate_batches(&config).unwrap_err().is_configuration());

        let config = SimulationConfig {
            offset_jitter: -0.3,
            ..SimulationConfig::default()
        };
        assert!(simulate_batches(&config).unwrap_err().is_configuration());

        let config = SimulationConfig {
            noise_sd: f64::NAN,
            ..SimulationConfig::default()
        };
        assert!(simulate_batches(&config).is_err());
    }
}
