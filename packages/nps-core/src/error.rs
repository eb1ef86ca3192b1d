//! Error types shared by the NPS pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias for fallible core operations.
pub type NpsResult<T> = Result<T, NpsError>;

/// Invalid run configuration. Always fatal, raised before any computation starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("End frequency ({end}) must be greater than start frequency ({start})")]
    InvalidFrequencyRange { start: f64, end: f64 },

    #[error("Frequency step must be positive, got {0}")]
    NonPositiveStep(f64),

    #[error("Fit order must be 1 or 2, got {0}")]
    InvalidFitOrder(usize),

    #[error("Truncation percentage must lie within 0..=100, got {0}")]
    InvalidTruncation(f64),

    #[error("Default pixel size must be positive, got {0} mm")]
    NonPositivePixelSize(f64),

    #[error("ROI ({x0}, {y0}, {x1}, {y1}) is invalid: x1 > x0 and y1 > y0 are required")]
    InvalidRoi {
        x0: usize,
        y0: usize,
        x1: usize,
        y1: usize,
    },
}

/// Errors raised while processing images and aggregating their profiles.
#[derive(Error, Debug)]
pub enum NpsError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A single image could not be read or decoded. Callers skip the image.
    #[error("Failed to decode {path:?}: {reason}")]
    Decode { path: PathBuf, reason: String },

    /// Per-image averaged profiles of one series do not share a common length.
    #[error("Averaged profiles differ in length: expected {expected}, found {found}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("Polynomial background fit failed: {0}")]
    Fit(String),

    #[error("Failed to walk {path:?}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl NpsError {
    pub(crate) fn decode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        NpsError::Decode {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
