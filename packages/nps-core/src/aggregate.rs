//! Averaging of profiles and scalar statistics across ROIs, images and series.

use ndarray::Array2;
use serde::Serialize;

use crate::error::{NpsError, NpsResult};
use crate::resample::Profile;

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Population standard deviation `sqrt(mean((x - mean)^2))`.
pub fn population_sd(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let squared: Vec<f64> = values.iter().map(|v| (v - m).powi(2)).collect();
    mean(&squared).map(f64::sqrt)
}

/// Mean and population standard deviation of raw pixel values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PixelStats {
    pub mean: f64,
    pub sd: f64,
}

pub fn pixel_stats(pixels: &Array2<f64>) -> Option<PixelStats> {
    if pixels.is_empty() {
        return None;
    }
    let n = pixels.len() as f64;
    let mean = pixels.sum() / n;
    let sd = (pixels.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    Some(PixelStats { mean, sd })
}

/// Element-wise mean of ROI profiles of possibly different lengths.
///
/// Shorter profiles contribute zeros beyond their end. The frequency axis is
/// taken from the first profile of maximal length. Returns `None` when there
/// is nothing to average.
pub fn average_roi_profiles(profiles: &[Profile]) -> Option<Profile> {
    let (longest_index, longest) = profiles
        .iter()
        .enumerate()
        .fold(None::<(usize, &Profile)>, |best, (i, p)| match best {
            Some((_, b)) if b.len() >= p.len() => best,
            _ => Some((i, p)),
        })?;
    let max_len = longest.len();
    log::trace!(
        "averaging {} ROI profiles, longest is #{} with {} samples",
        profiles.len(),
        longest_index,
        max_len
    );

    let mut sums = vec![0.0; max_len];
    for profile in profiles {
        for (sum, value) in sums.iter_mut().zip(&profile.values) {
            *sum += value;
        }
    }
    let n = profiles.len() as f64;
    let values = sums.into_iter().map(|s| s / n).collect();
    Some(Profile::new(values, longest.frequencies.clone()))
}

/// Element-wise mean of per-image averaged profiles of one series.
///
/// All profiles must share one length; a mismatch is reported instead of
/// being truncated or padded. Returns `Ok(None)` for an empty input.
pub fn mean_of_image_profiles(profiles: &[Profile]) -> NpsResult<Option<Profile>> {
    let Some(first) = profiles.first() else {
        return Ok(None);
    };
    let expected = first.len();
    if let Some(bad) = profiles.iter().find(|p| p.len() != expected) {
        return Err(NpsError::LengthMismatch {
            expected,
            found: bad.len(),
        });
    }

    let n = profiles.len() as f64;
    let values = (0..expected)
        .map(|i| profiles.iter().map(|p| p.values[i]).sum::<f64>() / n)
        .collect();
    Ok(Some(Profile::new(values, first.frequencies.clone())))
}
