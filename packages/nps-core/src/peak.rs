//! Dominant peak and half-width style deviations of an averaged NPS profile.

use serde::Serialize;

use crate::resample::{finite_max, Profile};

/// Fraction of the peak height that defines the deviation crossings.
pub const DEVIATION_LEVEL: f64 = 0.6;

/// Candidates lower than this fraction of the global maximum are ignored.
pub const MIN_CANDIDATE_RATIO: f64 = 0.1;

/// A local maximum found by [`collect_peaks`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakCandidate {
    pub value: f64,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeakInfo {
    pub peak_value: f64,
    pub peak_frequency: f64,
    /// Distance from the first left-side sample above the deviation level to
    /// the peak. `None` when undefined.
    pub left_deviation: Option<f64>,
    /// Distance from the peak to the first sample below the deviation level.
    pub right_deviation: Option<f64>,
    /// Set when no left-side falloff is observable and only the right
    /// deviation was measured.
    pub right_only: bool,
}

/// Single left-to-right pass recording the top of every rising run that is
/// followed by a decrease. NaN samples are skipped.
pub fn collect_peaks(values: &[f64]) -> Vec<PeakCandidate> {
    let mut peaks = Vec::new();
    let mut max_value = 0.0;
    let mut max_index = 0;
    let mut rising = false;

    for (i, &value) in values.iter().enumerate() {
        if value.is_nan() {
            continue;
        }
        if value >= max_value {
            max_value = value;
            max_index = i;
            rising = true;
        } else if rising {
            peaks.push(PeakCandidate {
                value: max_value,
                index: max_index,
            });
            rising = false;
        } else {
            max_value = value;
        }
    }
    peaks
}

/// Locates the dominant peak of `profile` and measures its deviations.
///
/// Never fails: an empty profile reports a zero peak at frequency 0, and a
/// profile without a usable local maximum falls back to its global maximum.
pub fn analyze_peak(profile: &Profile) -> PeakInfo {
    // Only samples that carry both a value and a frequency are considered.
    let n = profile.values.len().min(profile.frequencies.len());
    if n != profile.values.len() || n != profile.frequencies.len() {
        log::warn!(
            "Profile has {} values but {} frequencies, using the first {}",
            profile.values.len(),
            profile.frequencies.len(),
            n
        );
    }
    let values = &profile.values[..n];
    let frequencies = &profile.frequencies[..n];

    let Some(global_max) = finite_max(values) else {
        return PeakInfo {
            peak_value: 0.0,
            peak_frequency: 0.0,
            left_deviation: None,
            right_deviation: None,
            right_only: true,
        };
    };
    let global_index = values.iter().position(|&v| v == global_max).unwrap_or(0);

    let tallest = collect_peaks(values)
        .into_iter()
        .fold(None::<PeakCandidate>, |best, c| match best {
            Some(b) if b.value >= c.value => Some(b),
            _ => Some(c),
        });

    let (peak_value, peak_index, right_only) = match tallest {
        Some(c) if c.value >= MIN_CANDIDATE_RATIO * global_max => {
            let level = DEVIATION_LEVEL * c.value;
            let no_left_falloff = values[..c.index].iter().all(|&v| v > level);
            (c.value, c.index, no_left_falloff)
        }
        _ => (global_max, global_index, true),
    };

    let peak_frequency = frequencies[peak_index];
    let level = DEVIATION_LEVEL * peak_value;

    let right_deviation = values[peak_index..]
        .iter()
        .position(|&v| v < level)
        .map(|offset| frequencies[peak_index + offset] - peak_frequency);

    let left_deviation = if right_only {
        None
    } else {
        values[..peak_index]
            .iter()
            .position(|&v| v > level)
            .map(|j| peak_frequency - frequencies[j])
    };

    PeakInfo {
        peak_value,
        peak_frequency,
        left_deviation,
        right_deviation,
        right_only,
    }
}
