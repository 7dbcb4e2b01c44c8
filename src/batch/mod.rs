//! Sample to batch assignments.
//!
//! [`BatchLabels`] is the keyed form read from metadata (sample id → batch),
//! [`BatchDesign`] is the positional form the algorithms work on.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{CombatError, Result};
use crate::utils::BatchIdentifier;

/// Batch label for every sample, keyed by sample identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchLabels {
    sample_ids: Vec<String>,
    labels: Vec<String>,
}

impl BatchLabels {
    pub fn new(sample_ids: Vec<String>, labels: Vec<String>) -> Result<Self> {
        if sample_ids.len() != labels.len() {
            return Err(CombatError::DimensionMismatch {
                expected: format!("{} labels", sample_ids.len()),
                got: format!("{} labels", labels.len()),
            });
        }
        let mut seen = HashSet::with_capacity(sample_ids.len());
        for id in &sample_ids {
            if !seen.insert(id.as_str()) {
                return Err(CombatError::configuration(format!(
                    "sample '{}' has more than one batch label",
                    id
                )));
            }
        }
        Ok(Self { sample_ids, labels })
    }

    pub fn from_pairs<I, S, L>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, L)>,
        S: Into<String>,
        L: Into<String>,
    {
        let (sample_ids, labels) = pairs
            .into_iter()
            .map(|(s, l)| (s.into(), l.into()))
            .unzip();
        Self::new(sample_ids, labels)
    }

    pub fn len(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_ids.is_empty()
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn get(&self, sample_id: &str) -> Option<&str> {
        self.sample_ids
            .iter()
            .position(|s| s == sample_id)
            .map(|i| self.labels[i].as_str())
    }

    /// Distinct batch labels in sorted order.
    pub fn distinct(&self) -> Vec<&str> {
        let mut batches: Vec<&str> = self.labels.iter().map(String::as_str).collect();
        batches.sort_unstable();
        batches.dedup();
        batches
    }

    /// Returns the batch label of every entry of `sample_ids`, in that order.
    ///
    /// Both sides must name exactly the same samples.
    pub fn align(&self, sample_ids: &[String]) -> Result<Vec<String>> {
        let lookup: HashMap<&str, &str> = self
            .sample_ids
            .iter()
            .map(String::as_str)
            .zip(self.labels.iter().map(String::as_str))
            .collect();

        let aligned = sample_ids
            .iter()
            .map(|id| {
                lookup
                    .get(id.as_str())
                    .map(|l| l.to_string())
                    .ok_or_else(|| {
                        CombatError::configuration(format!("sample '{}' has no batch label", id))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        if self.sample_ids.len() != sample_ids.len() {
            let wanted: HashSet<&str> = sample_ids.iter().map(String::as_str).collect();
            let extra = self
                .sample_ids
                .iter()
                .find(|s| !wanted.contains(s.as_str()))
                .map(String::as_str)
                .unwrap_or("<duplicate>");
            return Err(CombatError::configuration(format!(
                "labelled sample '{}' is not a column of the expression matrix",
                extra
            )));
        }

        Ok(aligned)
    }
}

/// Positional batch structure of a label slice.
///
/// Batches are kept in sorted order so that every pass over them visits the
/// same sequence.
#[derive(Debug, Clone)]
pub struct BatchDesign<B: BatchIdentifier> {
    batches: Vec<B>,
    assignment: Vec<usize>,
    members: Vec<Vec<usize>>,
}

impl<B: BatchIdentifier> BatchDesign<B> {
    pub fn new(labels: &[B]) -> Self {
        let index: BTreeMap<&B, usize> = labels
            .iter()
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .enumerate()
            .map(|(i, b)| (b, i))
            .collect();

        let batches: Vec<B> = index.keys().map(|&b| b.clone()).collect();
        let assignment: Vec<usize> = labels.iter().map(|b| index[b]).collect();
        let mut members = vec![Vec::new(); batches.len()];
        for (sample, &batch) in assignment.iter().enumerate() {
            members[batch].push(sample);
        }

        Self {
            batches,
            assignment,
            members,
        }
    }

    pub fn n_batches(&self) -> usize {
        self.batches.len()
    }

    pub fn n_samples(&self) -> usize {
        self.assignment.len()
    }

    pub fn batches(&self) -> &[B] {
        &self.batches
    }

    /// Batch index of each sample.
    pub fn assignment(&self) -> &[usize] {
        &self.assignment
    }

    /// Sample indices of each batch.
    pub fn members(&self) -> &[Vec<usize>] {
        &self.members
    }

    pub fn sizes(&self) -> Vec<usize> {
        self.members.iter().map(Vec::len).collect()
    }

    /// Rejects structures with fewer than two batches or a batch smaller
    /// than `min_batch_size`.
    pub fn validate(&self, min_batch_size: usize) -> Result<()> {
        if self.n_batches() < 2 {
            return Err(CombatError::configuration(format!(
                "found {} distinct batch(es), at least 2 are required",
                self.n_batches()
            )));
        }
        for (batch, members) in self.batches.iter().zip(&self.members) {
            if members.len() < min_batch_size {
                return Err(CombatError::configuration(format!(
                    "batch '{}' has {} sample(s), at least {} required",
                    batch,
                    members.len(),
                    min_batch_size
                )));
            }
        }
        Ok(())
    }
}
