//! Run summary: separation before and after correction, and the check that
//! correction did not pull batches apart.

use std::fmt::Write;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Report payload of one correction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionResult {
    pub num_batches: usize,
    pub separation_before: f64,
    pub separation_after: f64,
    /// `separation_before / separation_after`; serialized as `null` when
    /// infinite.
    #[serde(
        serialize_with = "serialize_ratio",
        deserialize_with = "deserialize_ratio"
    )]
    pub ratio: f64,
}

fn serialize_ratio<S: Serializer>(ratio: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if ratio.is_finite() {
        serializer.serialize_some(ratio)
    } else {
        serializer.serialize_none()
    }
}

fn deserialize_ratio<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
}

/// Ratio of separation scores. Perfectly merged batches after correction
/// give `+∞`; no separation on either side gives 1.
pub fn separation_ratio(before: f64, after: f64) -> f64 {
    if after > 0.0 {
        before / after
    } else if before > 0.0 {
        f64::INFINITY
    } else {
        1.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Separation did not grow.
    Improved,
    /// Separation grew: the correction damaged the data.
    Degraded,
}

impl CorrectionResult {
    pub fn new(num_batches: usize, separation_before: f64, separation_after: f64) -> Self {
        Self {
            num_batches,
            separation_before,
            separation_after,
            ratio: separation_ratio(separation_before, separation_after),
        }
    }

    /// `Improved` when `ratio >= 1 - tolerance`.
    pub fn verdict(&self, tolerance: f64) -> Verdict {
        if self.ratio >= 1.0 - tolerance {
            Verdict::Improved
        } else {
            Verdict::Degraded
        }
    }
}

/// Markdown summary of a run. `parameters` should be a JSON object; its
/// entries are listed in a table.
pub fn render_summary(
    result: &CorrectionResult,
    verdict: Verdict,
    parameters: &serde_json::Value,
) -> String {
    let mut out = String::new();
    // writing into a String cannot fail
    let _ = writeln!(out, "# Batch correction with ComBat\n");
    let _ = writeln!(out, "Number of batches: {}\n", result.num_batches);
    let _ = writeln!(out, "| | Batch center distance |");
    let _ = writeln!(out, "|---|---|");
    let _ = writeln!(out, "| before correction | {:.4} |", result.separation_before);
    let _ = writeln!(out, "| after correction | {:.4} |\n", result.separation_after);
    let _ = writeln!(out, "Reduction ratio: {:.2}\n", result.ratio);

    match verdict {
        Verdict::Improved => {
            let _ = writeln!(
                out,
                "**Result:** batch correction reduced the batch center distance.\n"
            );
        }
        Verdict::Degraded => {
            let _ = writeln!(
                out,
                "**Error:** batch correction modified the data in an invalid way, \
                 the batch center ratio {:.2} is less than 1.\n",
                result.ratio
            );
        }
    }

    if let Some(entries) = parameters.as_object() {
        if !entries.is_empty() {
            let _ = writeln!(out, "## Parameters\n");
            let _ = writeln!(out, "| parameter | value |");
            let _ = writeln!(out, "|---|---|");
            for (key, value) in entries {
                let _ = writeln!(out, "| {} | {} |", key, value);
            }
        }
    }
    out
}
