//! End-to-end correction run: correct, score before and after, report.

use std::fs;

use anyhow::Context;
use log::{error, info};

use crate::batch::{BatchDesign, BatchLabels};
use crate::config::RunConfig;
use crate::correction::{BatchCorrection, Combat, Diagnostic};
use crate::dense::ExpressionMatrix;
use crate::error::Result;
use crate::evaluation::{BatchSeparation, SeparationEvaluator};
use crate::io;
use crate::report::{render_summary, CorrectionResult, Verdict};

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub corrected: ExpressionMatrix,
    pub result: CorrectionResult,
    pub verdict: Verdict,
    pub diagnostics: Vec<Diagnostic>,
    pub before: BatchSeparation<String>,
    pub after: BatchSeparation<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchCorrectionRun {
    config: RunConfig,
}

impl BatchCorrectionRun {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Corrects `matrix` and scores batch separation on the raw and the
    /// corrected data. A degraded verdict is logged, not returned as an
    /// error.
    pub fn run(&self, matrix: &ExpressionMatrix, labels: &BatchLabels) -> Result<RunOutput> {
        info!(
            "Received data matrix of shape (genes x cells) = ({}, {})",
            matrix.nfeatures(),
            matrix.nsamples()
        );
        let batches = labels.align(matrix.sample_ids())?;
        let design = BatchDesign::new(&batches);
        info!("Found the following batches: {:?}", design.batches());
        design.validate(self.config.combat.min_batch_size)?;

        info!("Calling combat for batch correction.");
        let mut combat = Combat::new(self.config.combat.clone());
        let corrected = combat.fit_transform(matrix.values(), &batches)?;
        let corrected = matrix.with_values(corrected)?;

        let evaluator = SeparationEvaluator::new(self.config.evaluation.clone());
        let before = evaluator.separation(matrix.samples_by_features().view(), &batches)?;
        let after = evaluator.separation(corrected.samples_by_features().view(), &batches)?;
        info!("Batch center distance before correction: {:.4}", before.score());
        info!("Batch center distance after correction: {:.4}", after.score());

        let result = CorrectionResult::new(design.n_batches(), before.score(), after.score());
        let verdict = result.verdict(self.config.ratio_tolerance);
        match verdict {
            Verdict::Improved => info!(
                "Batch correction completed without errors. Reduced batch center distance by ratio of {:.2}",
                result.ratio
            ),
            Verdict::Degraded => {
                error!("Batch correction modified data in an invalid way!");
                error!("Batch center ratio is less than 1: {:.2}", result.ratio);
            }
        }

        Ok(RunOutput {
            corrected,
            result,
            verdict,
            diagnostics: combat.diagnostics().to_vec(),
            before,
            after,
        })
    }

    /// Markdown summary of a finished run, with this run's parameters.
    pub fn summary(&self, output: &RunOutput) -> String {
        render_summary(&output.result, output.verdict, &self.config.parameters())
    }

    /// Reads the configured inputs, runs the correction and writes the
    /// corrected matrix, the summary and the result payload.
    pub fn run_files(&self) -> anyhow::Result<RunOutput> {
        let output = self.run_files_inner();
        if let Err(e) = &output {
            error!("Batch correction failed: {:#}", e);
        }
        output
    }

    fn run_files_inner(&self) -> anyhow::Result<RunOutput> {
        let inputs = &self.config.inputs;
        let outputs = &self.config.outputs;
        let columns = &self.config.columns;

        info!("Loading gene expression and cell annotation tables");
        let matrix = io::read_expression_file(&inputs.expression, columns).with_context(|| {
            format!("reading expression table {}", inputs.expression.display())
        })?;
        let labels = io::read_batch_labels_file(&inputs.cell_metadata, columns).with_context(|| {
            format!("reading cell metadata {}", inputs.cell_metadata.display())
        })?;

        let output = self.run(&matrix, &labels)?;

        info!("Storing matrix of batch-corrected gene expressions.");
        io::write_matrix_file(&outputs.corrected_matrix, &output.corrected).with_context(|| {
            format!("writing {}", outputs.corrected_matrix.display())
        })?;
        fs::write(&outputs.summary, self.summary(&output))
            .with_context(|| format!("writing {}", outputs.summary.display()))?;
        let payload = serde_json::to_string_pretty(&output.result)?;
        fs::write(&outputs.result, payload)
            .with_context(|| format!("writing {}", outputs.result.display()))?;
        info!("Done.");

        Ok(output)
    }
}

/// Loads a JSON configuration file and runs [`BatchCorrectionRun::run_files`]
/// with it. Relative paths are taken from the file's directory.
pub fn run_from_config_file<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<RunOutput> {
    let path = path.as_ref();
    let config = RunConfig::load(path)
        .with_context(|| format!("loading configuration {}", path.display()))?;
    BatchCorrectionRun::new(config).run_files()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulate::{simulate_batches, SimulationConfig};
    use crate::statistics::subset_mean;
    use ndarray::{array, Axis};

    fn example() -> (ExpressionMatrix, BatchLabels) {
        let a = array![[1.0, 2.0, 4.0], [3.0, 5.0, 6.0], [2.0, 3.5, 5.0]];
        let b = &a + 5.0;
        let values = ndarray::concatenate(Axis(1), &[a.view(), b.view()]).unwrap();
        let cells: Vec<String> = (1..=6).map(|i| format!("c{}", i)).collect();
        let matrix = ExpressionMatrix::new(
            values,
            vec!["g1".into(), "g2".into(), "g3".into()],
            cells.clone(),
        )
        .unwrap();
        let labels = BatchLabels::new(
            cells,
            ["A", "A", "A", "B", "B", "B"].iter().map(|s| s.to_string()).collect(),
        )
        .unwrap();
        (matrix, labels)
    }

    #[test]
    fn test_shifted_example_end_to_end() {
        let (matrix, labels) = example();
        let output = BatchCorrectionRun::default().run(&matrix, &labels).unwrap();

        assert_eq!(output.result.num_batches, 2);
        assert!(output.result.ratio > 1.0);
        assert_eq!(output.verdict, Verdict::Improved);
        assert!(output.diagnostics.is_empty());
        assert_eq!(output.corrected.sample_ids(), matrix.sample_ids());

        let values = output.corrected.values();
        for row in values.rows() {
            let diff = subset_mean(row, &[0, 1, 2]) - subset_mean(row, &[3, 4, 5]);
            assert!(diff.abs() < 0.5, "batch mean difference {}", diff);
        }
    }

    #[test]
    fn test_separation_shrinks_for_shifted_simulations() {
        let simulate = |offset: f64| {
            simulate_batches(&SimulationConfig {
                n_features: 30,
                cells_per_batch: vec![20, 20],
                batch_offsets: vec![0.0, offset],
                offset_jitter: 1.0,
                ..SimulationConfig::default()
            })
            .unwrap()
        };
        let run = BatchCorrectionRun::default();

        let (matrix, labels) = simulate(2.0);
        let output = run.run(&matrix, &labels).unwrap();
        assert!(output.result.ratio > 1.0);

        let (raw, labels) = simulate(0.0);
        let raw_separation = SeparationEvaluator::default()
            .score_matrix(&raw, &labels)
            .unwrap()
            .score();
        let (matrix, labels) = simulate(8.0);
        let output = run.run(&matrix, &labels).unwrap();
        assert!(output.result.separation_after < raw_separation);
        assert!(output.result.separation_before > raw_separation);
    }

    #[test]
    fn test_single_batch_is_rejected() {
        let (matrix, _) = example();
        let labels = BatchLabels::new(
            matrix.sample_ids().to_vec(),
            vec!["A".to_string(); matrix.nsamples()],
        )
        .unwrap();
        let err = BatchCorrectionRun::default().run(&matrix, &labels).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_unlabelled_sample_is_rejected() {
        let (matrix, labels) = example();
        let partial = BatchLabels::new(
            labels.sample_ids()[..5].to_vec(),
            labels.labels()[..5].to_vec(),
        )
        .unwrap();
        let err = BatchCorrectionRun::default().run(&matrix, &partial).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_run_from_config_file() {
        let (matrix, labels) = example();
        let dir = tempfile::tempdir().unwrap();

        let mut expression = String::from("gene\tcell\tvalue\n");
        for (g, row) in matrix.values().rows().into_iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                expression.push_str(&format!(
                    "{}\t{}\t{}\n",
                    matrix.feature_ids()[g],
                    matrix.sample_ids()[j],
                    v
                ));
            }
        }
        fs::write(dir.path().join("expr.tsv"), expression).unwrap();

        let mut meta = String::from("cell\tbatch\n");
        for (cell, batch) in labels.sample_ids().iter().zip(labels.labels()) {
            meta.push_str(&format!("{}\t{}\n", cell, batch));
        }
        fs::write(dir.path().join("meta.tsv"), meta).unwrap();

        let config = r#"{
            "columns": { "cells": "cell", "genes": "gene", "expression": "value", "batch": "batch" },
            "inputs": { "expression": "expr.tsv", "cell_metadata": "meta.tsv" }
        }"#;
        let config_path = dir.path().join("parameters.json");
        fs::write(&config_path, config).unwrap();

        let output = run_from_config_file(&config_path).unwrap();
        assert_eq!(output.verdict, Verdict::Improved);

        let corrected =
            io::read_matrix(fs::File::open(dir.path().join("batch_corrected_matrix.tsv")).unwrap())
                .unwrap();
        assert_eq!(corrected.shape(), (3, 6));
        assert_eq!(corrected.feature_ids(), matrix.feature_ids());

        let summary = fs::read_to_string(dir.path().join("summary.md")).unwrap();
        assert!(summary.contains("Number of batches: 2"));
        assert!(summary.contains("| random_seed | 4711 |"));

        let result: CorrectionResult =
            serde_json::from_str(&fs::read_to_string(dir.path().join("result.json")).unwrap())
                .unwrap();
        assert_eq!(result, output.result);
    }

    #[test]
    fn test_missing_input_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("parameters.json"), "{}").unwrap();
        let err = run_from_config_file(dir.path().join("parameters.json")).unwrap_err();
        assert!(format!("{:#}", err).contains("expression.tsv"));
    }
}
