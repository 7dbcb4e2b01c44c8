//! Error types for batch correction and separation scoring

use thiserror::Error;

/// Main error type for the correction and evaluation routines
#[derive(Error, Debug)]
pub enum CombatError {
    /// Degenerate batch structure or invalid parameters. Raised before any
    /// computation starts.
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: String, got: String },

    #[error("Model must be fitted before transform")]
    NotFitted,

    #[error("Numerical failure in {operation}: {details}")]
    Numerical { operation: String, details: String },

    #[error("Invalid input data: {reason}")]
    Input { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CombatError {
    pub(crate) fn configuration(reason: impl Into<String>) -> Self {
        CombatError::Configuration {
            reason: reason.into(),
        }
    }

    pub(crate) fn input(reason: impl Into<String>) -> Self {
        CombatError::Input {
            reason: reason.into(),
        }
    }

    /// True for errors caused by degenerate batch structure or parameters.
    pub fn is_configuration(&self) -> bool {
        matches!(self, CombatError::Configuration { .. })
    }
}

/// Result type alias for correction and evaluation operations
pub type Result<T> = std::result::Result<T, CombatError>;
