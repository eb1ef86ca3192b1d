//! Run configuration for the NPS pipeline.
//!
//! All options are supplied once at the start of a run. `NpsConfig::validate`
//! must succeed before any image is touched.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::grid::FrequencyGrid;

/// Degree of the polynomial background surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitOrder {
    Linear,
    Quadratic,
}

impl FitOrder {
    pub fn degree(self) -> usize {
        match self {
            FitOrder::Linear => 1,
            FitOrder::Quadratic => 2,
        }
    }
}

impl TryFrom<usize> for FitOrder {
    type Error = ConfigError;

    fn try_from(order: usize) -> Result<Self, Self::Error> {
        match order {
            1 => Ok(FitOrder::Linear),
            2 => Ok(FitOrder::Quadratic),
            other => Err(ConfigError::InvalidFitOrder(other)),
        }
    }
}

/// Background removal strategy applied to every ROI before the FFT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetrendMode {
    /// Subtract the scalar mean of the ROI.
    Flat,
    /// Subtract a least-squares polynomial surface.
    Polynomial(FitOrder),
}

/// How ROI dictionary keys are matched against discovered file paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// The key only has to be contained in the file path.
    #[default]
    Substring,
    /// The key must equal the full path or the file's basename.
    Exact,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NpsConfig {
    pub use_fitting: bool,
    pub fit_order: usize,
    pub use_truncation: bool,
    pub trunc_percentage: f64,
    pub start_freq: f64,
    pub end_freq: f64,
    pub step: f64,
    /// Fallback pixel spacing in mm/pixel.
    pub pixel_size_default: f64,
    pub first_data_set_layout: bool,
    /// File name fragments used during discovery (case-insensitive).
    pub extensions: Vec<String>,
    pub exclude_start: usize,
    pub exclude_end: usize,
    pub match_mode: MatchMode,
    /// Worker threads for ROI-level work. 0 lets rayon decide.
    pub jobs: usize,
}

impl Default for NpsConfig {
    fn default() -> Self {
        NpsConfig {
            use_fitting: false,
            fit_order: 2,
            use_truncation: false,
            trunc_percentage: 1.0,
            start_freq: 0.0,
            end_freq: 20.0,
            step: 0.01,
            pixel_size_default: 0.781,
            first_data_set_layout: false,
            extensions: [".tif", ".dcm", ".png", ".jpg"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            exclude_start: 0,
            exclude_end: 0,
            match_mode: MatchMode::Substring,
            jobs: 0,
        }
    }
}

impl NpsConfig {
    /// Checks every option that can make a run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        FrequencyGrid::new(self.start_freq, self.end_freq, self.step)?;
        FitOrder::try_from(self.fit_order)?;
        if !(0.0..=100.0).contains(&self.trunc_percentage) {
            return Err(ConfigError::InvalidTruncation(self.trunc_percentage));
        }
        if !(self.pixel_size_default > 0.0) {
            return Err(ConfigError::NonPositivePixelSize(self.pixel_size_default));
        }
        Ok(())
    }

    pub fn detrend_mode(&self) -> Result<DetrendMode, ConfigError> {
        if self.use_fitting {
            Ok(DetrendMode::Polynomial(FitOrder::try_from(self.fit_order)?))
        } else {
            Ok(DetrendMode::Flat)
        }
    }

    pub fn frequency_grid(&self) -> Result<FrequencyGrid, ConfigError> {
        FrequencyGrid::new(self.start_freq, self.end_freq, self.step)
    }

    /// Truncation threshold in percent, or `None` when truncation is disabled.
    pub fn truncation(&self) -> Option<f64> {
        self.use_truncation.then_some(self.trunc_percentage)
    }
}
