pub mod batch;
pub mod config;
pub mod correction;
pub mod dense;
pub mod dimred;
pub mod error;
pub mod evaluation;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod report;
pub mod similarity;
pub mod simulate;
pub mod statistics;
pub mod svd;
mod utils;

pub use batch::{BatchDesign, BatchLabels};
pub use correction::{BatchCorrection, Combat, CombatParams, Diagnostic};
pub use dense::ExpressionMatrix;
pub use error::{CombatError, Result};
pub use evaluation::{BatchSeparation, SeparationEvaluator};
pub use pipeline::{BatchCorrectionRun, RunOutput};
pub use utils::BatchIdentifier;
