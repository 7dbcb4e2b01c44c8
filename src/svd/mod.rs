//! Truncated singular value decompositions of dense matrices.
//!
//! Only the right singular vectors are kept since PCA projects with them.

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2, ArrayView2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::error::{CombatError, Result};

/// Leading `k` singular values (descending) and right singular vectors
/// (`k × n_cols`).
#[derive(Debug, Clone)]
pub struct TruncatedSvd {
    s: Array1<f64>,
    vt: Array2<f64>,
}

impl TruncatedSvd {
    pub fn s(&self) -> &Array1<f64> {
        &self.s
    }

    pub fn vt(&self) -> &Array2<f64> {
        &self.vt
    }
}

fn to_dmatrix(x: ArrayView2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(x.nrows(), x.ncols(), |i, j| x[[i, j]])
}

fn check_rank(x: ArrayView2<f64>, k: usize) -> Result<()> {
    let max_rank = x.nrows().min(x.ncols());
    if k == 0 || k > max_rank {
        return Err(CombatError::configuration(format!(
            "cannot extract {} singular vectors from a {}x{} matrix",
            k,
            x.nrows(),
            x.ncols()
        )));
    }
    Ok(())
}

/// Orients every row so that its largest-magnitude entry is positive.
pub fn flip_signs(vt: &mut Array2<f64>) {
    for mut row in vt.rows_mut() {
        let pivot = row
            .iter()
            .copied()
            .fold(0.0f64, |best, v| if v.abs() > best.abs() { v } else { best });
        if pivot < 0.0 {
            row.mapv_inplace(|v| -v);
        }
    }
}

fn leading(s: &DVector<f64>, vt: &DMatrix<f64>, k: usize) -> TruncatedSvd {
    let mut order: Vec<usize> = (0..s.len()).collect();
    order.sort_by(|&a, &b| s[b].total_cmp(&s[a]));

    let n_cols = vt.ncols();
    let mut s_out = Array1::zeros(k);
    let mut vt_out = Array2::zeros((k, n_cols));
    for (r, &i) in order.iter().take(k).enumerate() {
        s_out[r] = s[i];
        for j in 0..n_cols {
            vt_out[[r, j]] = vt[(i, j)];
        }
    }
    flip_signs(&mut vt_out);

    TruncatedSvd {
        s: s_out,
        vt: vt_out,
    }
}

/// Full SVD through nalgebra, truncated to `k` components.
pub fn exact(x: ArrayView2<f64>, k: usize) -> Result<TruncatedSvd> {
    check_rank(x, k)?;
    let svd = to_dmatrix(x).svd(false, true);
    let vt = svd.v_t.ok_or_else(|| CombatError::Numerical {
        operation: "SVD".to_string(),
        details: "right singular vectors were not computed".to_string(),
    })?;
    Ok(leading(&svd.singular_values, &vt, k))
}

/// Randomized range-finder SVD (Halko, Martinsson & Tropp 2011).
///
/// The sketch has `k + n_oversamples` columns, capped at the matrix rank
/// bound, and is refined with `n_power_iterations` QR-stabilised power
/// iterations. The Gaussian test matrix is drawn from `seed`.
pub fn randomized(
    x: ArrayView2<f64>,
    k: usize,
    n_oversamples: usize,
    n_power_iterations: usize,
    seed: u64,
) -> Result<TruncatedSvd> {
    check_rank(x, k)?;
    let (n_rows, n_cols) = x.dim();
    let sketch = (k + n_oversamples).min(n_rows.min(n_cols));

    let a = to_dmatrix(x);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let omega = DMatrix::from_fn(n_cols, sketch, |_, _| {
        let v: f64 = StandardNormal.sample(&mut rng);
        v
    });

    let mut q = (&a * &omega).qr().q();
    for _ in 0..n_power_iterations {
        let z = (a.transpose() * &q).qr().q();
        q = (&a * &z).qr().q();
    }

    let b = q.transpose() * &a;
    let svd = b.svd(false, true);
    let vt = svd.v_t.ok_or_else(|| CombatError::Numerical {
        operation: "randomized SVD".to_string(),
        details: "right singular vectors were not computed".to_string(),
    })?;
    Ok(leading(&svd.singular_values, &vt, k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};

    fn low_rank(n: usize, p: usize) -> Array2<f64> {
        Array2::from_shape_fn((n, p), |(i, j)| {
            let i = i as f64;
            let j = j as f64;
            i * (1.0 + 0.1 * j) + (0.7 * i).sin() * (j - 4.0)
        })
    }

    #[test]
    fn test_simple_svd() {
        let a = array![[1.0, 2.0], [3.0, 4.0]];
        let svd = exact(a.view(), 2).unwrap();
        assert_eq!(svd.vt().shape(), &[2, 2]);
        assert_abs_diff_eq!(svd.s()[0], 5.4649857, epsilon = 1e-6);
        assert_abs_diff_eq!(svd.s()[1], 0.3659662, epsilon = 1e-6);
    }

    #[test]
    fn test_right_vectors_are_orthonormal() {
        let x = low_rank(12, 6);
        let svd = exact(x.view(), 3).unwrap();
        let gram = svd.vt().dot(&svd.vt().t());
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(gram[[i, j]], expected, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_flip_signs_makes_pivot_positive() {
        let mut vt = array![[0.2, -0.9, 0.1], [0.5, 0.1, -0.2]];
        flip_signs(&mut vt);
        assert_eq!(vt.row(0).to_vec(), vec![-0.2, 0.9, -0.1]);
        assert_eq!(vt.row(1).to_vec(), vec![0.5, 0.1, -0.2]);
    }

    #[test]
    fn test_randomized_matches_exact_on_low_rank() {
        let x = low_rank(30, 10);
        let reference = exact(x.view(), 2).unwrap();
        let approx = randomized(x.view(), 2, 5, 2, 4711).unwrap();

        for k in 0..2 {
            assert_abs_diff_eq!(approx.s()[k], reference.s()[k], epsilon = 1e-8);
            for j in 0..10 {
                assert_abs_diff_eq!(approx.vt()[[k, j]], reference.vt()[[k, j]], epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_randomized_is_reproducible() {
        let x = low_rank(20, 8);
        let first = randomized(x.view(), 2, 2, 1, 7).unwrap();
        let second = randomized(x.view(), 2, 2, 1, 7).unwrap();
        assert_eq!(first.vt(), second.vt());
    }

    #[test]
    fn test_rejects_too_many_components() {
        let x = low_rank(3, 2);
        assert!(exact(x.view(), 3).is_err());
        assert!(randomized(x.view(), 0, 1, 1, 1).is_err());
    }
}
