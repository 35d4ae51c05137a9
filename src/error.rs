//! Error types for LaunchLens
//!
//! Degenerate statistical inputs (an empty arm, a zero standard error)
//! resolve to neutral results inside the comparators and never reach this
//! enum.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the statistical core and its data-access layer
#[derive(Error, Debug)]
pub enum LaunchLensError {
    #[error("No experiment-period sessions found ({context}). Check experiment_id or data.")]
    NoData { context: String },

    #[error("expected_treatment_share must be in (0, 1), got {0}")]
    InvalidShare(f64),

    #[error("Cannot run an SRM check on an empty allocation (n_control + n_treatment == 0)")]
    EmptyAllocation,

    #[error("CUPED requires paired samples: y has {y} values, x has {x}")]
    LengthMismatch { y: usize, x: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    #[error("Distribution error: {0}")]
    Distribution(String),

    #[error("Failed to parse {path}:{line}: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for LaunchLens operations
pub type Result<T> = std::result::Result<T, LaunchLensError>;
