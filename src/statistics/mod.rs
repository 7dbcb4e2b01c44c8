//! Small descriptive statistics used by the correction routines.

use ndarray::{ArrayView1, Axis};

/// Arithmetic mean. Returns `NaN` for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    ArrayView1::from(values).mean().unwrap_or(f64::NAN)
}

/// Variance with `ddof` delta degrees of freedom, `None` if there are not
/// more than `ddof` values.
pub fn variance(values: &[f64], ddof: usize) -> Option<f64> {
    if values.len() <= ddof {
        return None;
    }
    Some(ArrayView1::from(values).var(ddof as f64))
}

/// Collects `row[i]` for each index.
pub fn gather(row: ArrayView1<f64>, indices: &[usize]) -> Vec<f64> {
    row.select(Axis(0), indices).to_vec()
}

/// Mean of `row` restricted to `indices`.
pub fn subset_mean(row: ArrayView1<f64>, indices: &[usize]) -> f64 {
    row.select(Axis(0), indices).mean().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_mean_and_variance() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(mean(&v), 2.5);
        assert_relative_eq!(variance(&v, 1).unwrap(), 5.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(variance(&v, 0).unwrap(), 1.25, epsilon = 1e-12);
    }

    #[test]
    fn test_variance_too_few_values() {
        assert!(variance(&[1.0], 1).is_none());
        assert!(variance(&[], 0).is_none());
    }

    #[test]
    fn test_subset_helpers() {
        let row = array![1.0, 10.0, 3.0, 20.0];
        assert_eq!(gather(row.view(), &[1, 3]), vec![10.0, 20.0]);
        assert_relative_eq!(subset_mean(row.view(), &[0, 2]), 2.0);
    }
}
