//! Run configuration, read once from a JSON parameter file.
//!
//! Every field has a default, so a partial file (or `{}`) is valid.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::correction::CombatParams;
use crate::error::Result;
use crate::evaluation::EvaluationParams;

/// Physical column names of the tabular inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    /// Sample (cell) identifier, in both the expression and the metadata
    /// file.
    pub cells: String,
    /// Feature (gene) identifier in the expression file.
    pub genes: String,
    pub expression: String,
    /// Batch label in the metadata file.
    pub batch: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            cells: "cellId*Ganzzahl".to_string(),
            genes: "entrezId*Ganzzahl".to_string(),
            expression: "expressionValue*Zahl".to_string(),
            batch: "batch".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputPaths {
    /// Long-format expression table.
    pub expression: PathBuf,
    /// Per-cell metadata holding the batch column.
    pub cell_metadata: PathBuf,
}

impl Default for InputPaths {
    fn default() -> Self {
        Self {
            expression: PathBuf::from("expression.tsv"),
            cell_metadata: PathBuf::from("cells_meta.tsv"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputPaths {
    pub corrected_matrix: PathBuf,
    pub summary: PathBuf,
    pub result: PathBuf,
}

impl Default for OutputPaths {
    fn default() -> Self {
        Self {
            corrected_matrix: PathBuf::from("batch_corrected_matrix.tsv"),
            summary: PathBuf::from("summary.md"),
            result: PathBuf::from("result.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub columns: ColumnMapping,
    pub combat: CombatParams,
    pub evaluation: EvaluationParams,
    /// A separation ratio down to `1 - ratio_tolerance` still counts as a
    /// successful correction.
    pub ratio_tolerance: f64,
    pub inputs: InputPaths,
    pub outputs: OutputPaths,
}

impl RunConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Reads a configuration file and resolves its relative paths against
    /// the directory holding the file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = Self::from_json_file(path)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    pub fn resolve_relative_to(&mut self, base: &Path) {
        for path in [
            &mut self.inputs.expression,
            &mut self.inputs.cell_metadata,
            &mut self.outputs.corrected_matrix,
            &mut self.outputs.summary,
            &mut self.outputs.result,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Algorithm parameters as a JSON object, for the run summary.
    pub fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "random_seed": self.evaluation.random_seed,
            "n_components": self.evaluation.n_components,
            "svd_method": self.evaluation.svd_method,
            "convergence_threshold": self.combat.convergence_threshold,
            "max_iterations": self.combat.max_iterations,
            "min_batch_size": self.combat.min_batch_size,
            "standardization": self.combat.standardization,
            "ratio_tolerance": self.ratio_tolerance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correction::Standardization;
    use crate::dimred::pca::SVDMethod;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = RunConfig::from_json_str("{}").unwrap();
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.columns.genes, "entrezId*Ganzzahl");
        assert_eq!(config.evaluation.random_seed, 4711);
        assert_eq!(config.combat.max_iterations, 50);
        assert_eq!(config.ratio_tolerance, 0.0);
    }

    #[test]
    fn test_partial_overrides() {
        let config = RunConfig::from_json_str(
            r#"{
                "columns": { "batch": "_generated_batch*Text" },
                "combat": { "convergence_threshold": 1e-6, "standardization": "overall" },
                "evaluation": {
                    "svd_method": { "kind": "randomized", "n_oversamples": 10, "n_power_iterations": 3 }
                },
                "outputs": { "summary": "out/summary.md" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.columns.batch, "_generated_batch*Text");
        assert_eq!(config.columns.cells, "cellId*Ganzzahl");
        assert_eq!(config.combat.convergence_threshold, 1e-6);
        assert_eq!(config.combat.standardization, Standardization::Overall);
        assert_eq!(config.combat.max_iterations, 50);
        assert_eq!(
            config.evaluation.svd_method,
            SVDMethod::Randomized {
                n_oversamples: 10,
                n_power_iterations: 3
            }
        );
        assert_eq!(config.outputs.summary, PathBuf::from("out/summary.md"));
        assert_eq!(config.outputs.result, PathBuf::from("result.json"));
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(RunConfig::from_json_str("{ \"combat\": 3 }").is_err());
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parameters.json");
        std::fs::write(
            &path,
            r#"{ "inputs": { "expression": "/data/expr.tsv" }, "outputs": { "summary": "summary.md" } }"#,
        )
        .unwrap();

        let config = RunConfig::load(&path).unwrap();
        assert_eq!(config.inputs.expression, PathBuf::from("/data/expr.tsv"));
        assert_eq!(config.inputs.cell_metadata, dir.path().join("cells_meta.tsv"));
        assert_eq!(config.outputs.summary, dir.path().join("summary.md"));
        assert!(RunConfig::load(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_parameters_object() {
        let params = RunConfig::default().parameters();
        assert_eq!(params["random_seed"], 4711);
        assert_eq!(params["svd_method"]["kind"], "exact");
        assert_eq!(params["standardization"], "pooled");
    }
}
