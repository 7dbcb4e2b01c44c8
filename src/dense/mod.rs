//! Dense labelled expression matrix.

use std::collections::{HashMap, HashSet};

use ndarray::{Array2, ArrayView2};

use crate::error::{CombatError, Result};

/// Features × samples expression values with row and column identifiers.
///
/// The correction routines read this orientation directly; the separation
/// scoring works on [`ExpressionMatrix::samples_by_features`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionMatrix {
    values: Array2<f64>,
    feature_ids: Vec<String>,
    sample_ids: Vec<String>,
}

impl ExpressionMatrix {
    pub fn new(values: Array2<f64>, feature_ids: Vec<String>, sample_ids: Vec<String>) -> Result<Self> {
        if values.nrows() != feature_ids.len() {
            return Err(CombatError::DimensionMismatch {
                expected: format!("{} feature rows", feature_ids.len()),
                got: format!("{} rows", values.nrows()),
            });
        }
        if values.ncols() != sample_ids.len() {
            return Err(CombatError::DimensionMismatch {
                expected: format!("{} sample columns", sample_ids.len()),
                got: format!("{} columns", values.ncols()),
            });
        }
        check_unique("feature", &feature_ids)?;
        check_unique("sample", &sample_ids)?;

        Ok(Self {
            values,
            feature_ids,
            sample_ids,
        })
    }

    /// Pivots `(feature, sample, value)` triples into a matrix. Rows and
    /// columns follow first appearance; absent pairs are zero.
    pub fn from_triples<I, F, S>(triples: I) -> Result<Self>
    where
        I: IntoIterator<Item = (F, S, f64)>,
        F: Into<String>,
        S: Into<String>,
    {
        let mut feature_index: HashMap<String, usize> = HashMap::new();
        let mut sample_index: HashMap<String, usize> = HashMap::new();
        let mut feature_ids = Vec::new();
        let mut sample_ids = Vec::new();
        let mut entries = Vec::new();

        for (feature, sample, value) in triples {
            let feature = feature.into();
            let sample = sample.into();
            let row = *feature_index.entry(feature.clone()).or_insert_with(|| {
                feature_ids.push(feature);
                feature_ids.len() - 1
            });
            let col = *sample_index.entry(sample.clone()).or_insert_with(|| {
                sample_ids.push(sample);
                sample_ids.len() - 1
            });
            entries.push((row, col, value));
        }

        let mut values = Array2::zeros((feature_ids.len(), sample_ids.len()));
        let mut filled = HashSet::with_capacity(entries.len());
        for (row, col, value) in entries {
            if !filled.insert((row, col)) {
                return Err(CombatError::input(format!(
                    "duplicate entry for feature '{}' and sample '{}'",
                    feature_ids[row], sample_ids[col]
                )));
            }
            values[[row, col]] = value;
        }

        Self::new(values, feature_ids, sample_ids)
    }

    pub fn nfeatures(&self) -> usize {
        self.values.nrows()
    }

    pub fn nsamples(&self) -> usize {
        self.values.ncols()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn into_values(self) -> Array2<f64> {
        self.values
    }

    pub fn feature_ids(&self) -> &[String] {
        &self.feature_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Owned samples × features copy, the layout PCA expects.
    pub fn samples_by_features(&self) -> Array2<f64> {
        self.values.t().to_owned()
    }

    /// Matrix with the same identifiers and new values.
    pub fn with_values(&self, values: Array2<f64>) -> Result<Self> {
        if values.dim() != self.values.dim() {
            return Err(CombatError::DimensionMismatch {
                expected: format!("{:?}", self.values.dim()),
                got: format!("{:?}", values.dim()),
            });
        }
        Ok(Self {
            values,
            feature_ids: self.feature_ids.clone(),
            sample_ids: self.sample_ids.clone(),
        })
    }
}

fn check_unique(axis: &str, ids: &[String]) -> Result<()> {
    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(id.as_str()) {
            return Err(CombatError::configuration(format!(
                "duplicate {} identifier '{}'",
                axis, id
            )));
        }
    }
    Ok(())
}
