//! Mapping native ROI profiles onto the shared frequency grid.

use serde::Serialize;

use crate::grid::FrequencyGrid;
use crate::spectrum::NpsProfile;

/// A sampled profile: `values[i]` belongs to `frequencies[i]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Profile {
    pub values: Vec<f64>,
    pub frequencies: Vec<f64>,
}

impl Profile {
    pub fn new(values: Vec<f64>, frequencies: Vec<f64>) -> Self {
        debug_assert_eq!(values.len(), frequencies.len());
        Profile {
            values,
            frequencies,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<&NpsProfile> for Profile {
    fn from(nps: &NpsProfile) -> Self {
        Profile::new(nps.values.clone(), nps.frequencies.clone())
    }
}

/// Largest non-NaN value, or `None` for an empty or all-NaN slice.
pub(crate) fn finite_max(values: &[f64]) -> Option<f64> {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(None, |acc, v| match acc {
            Some(m) if m >= v => Some(m),
            _ => Some(v),
        })
}

/// Keeps the leading samples whose value exceeds `percentage`% of the
/// profile maximum. The first sample at or below the threshold ends the
/// profile, later samples are never re-admitted.
pub fn truncate(profile: &Profile, percentage: f64) -> Profile {
    let Some(max) = finite_max(&profile.values) else {
        return Profile::default();
    };
    let threshold = percentage / 100.0 * max;
    let keep = profile
        .values
        .iter()
        .take_while(|&&v| v > threshold)
        .count();
    Profile::new(
        profile.values[..keep].to_vec(),
        profile.frequencies[..keep].to_vec(),
    )
}

/// Index of the largest native frequency `<= f`. Ties resolve to the first
/// occurrence.
fn lower_bracket(frequencies: &[f64], f: f64) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, &freq) in frequencies.iter().enumerate() {
        if freq <= f && best.map_or(true, |b| freq > frequencies[b]) {
            best = Some(i);
        }
    }
    best
}

/// Index of the smallest native frequency `>= f`. Ties resolve to the first
/// occurrence.
fn upper_bracket(frequencies: &[f64], f: f64) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, &freq) in frequencies.iter().enumerate() {
        if freq >= f && best.map_or(true, |b| freq < frequencies[b]) {
            best = Some(i);
        }
    }
    best
}

/// Linearly interpolates `profile` at every grid frequency it brackets.
///
/// Resampling stops at the first grid frequency outside the native range, so
/// the result is a prefix of the grid. Negative interpolants are clamped to 0.
pub fn resample_onto_grid(profile: &Profile, grid: &FrequencyGrid) -> Profile {
    let native_f = &profile.frequencies;
    let native_v = &profile.values;

    let mut values = Vec::with_capacity(grid.len());
    let mut frequencies = Vec::with_capacity(grid.len());

    for f in grid.iter() {
        let (Some(lo), Some(hi)) = (lower_bracket(native_f, f), upper_bracket(native_f, f)) else {
            break;
        };
        let (f_lo, f_hi) = (native_f[lo], native_f[hi]);
        let value = if f_lo == f_hi {
            native_v[lo]
        } else {
            native_v[lo] + (f - f_lo) * (native_v[hi] - native_v[lo]) / (f_hi - f_lo)
        };
        values.push(if value < 0.0 { 0.0 } else { value });
        frequencies.push(f);
    }

    Profile::new(values, frequencies)
}
