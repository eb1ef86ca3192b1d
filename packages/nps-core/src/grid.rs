//! Common frequency axis shared by all resampled ROI profiles.

use crate::error::ConfigError;

/// Evenly spaced frequencies (line pairs per cm) from `start` to `end` inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyGrid {
    start: f64,
    end: f64,
    step: f64,
    frequencies: Vec<f64>,
}

impl FrequencyGrid {
    /// Builds `floor((end - start) / step) + 1` samples spread linearly over
    /// `[start, end]`.
    pub fn new(start: f64, end: f64, step: f64) -> Result<Self, ConfigError> {
        if !(step > 0.0) || !step.is_finite() {
            return Err(ConfigError::NonPositiveStep(step));
        }
        if !(end > start) || !start.is_finite() || !end.is_finite() {
            return Err(ConfigError::InvalidFrequencyRange { start, end });
        }

        let count = ((end - start) / step).floor() as usize + 1;
        let frequencies = if count == 1 {
            vec![start]
        } else {
            let spacing = (end - start) / (count - 1) as f64;
            (0..count)
                .map(|i| {
                    if i == count - 1 {
                        end
                    } else {
                        start + i as f64 * spacing
                    }
                })
                .collect()
        };

        Ok(FrequencyGrid {
            start,
            end,
            step,
            frequencies,
        })
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.frequencies
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.frequencies.iter().copied()
    }
}
