//! Radial averaging of a centred 2D power spectrum.

use ndarray::Array2;

/// Reduces a zero-frequency-centred 2D array to a 1D radial mean profile.
///
/// The centre is `(cols / 2, rows / 2)`. For every integer radius
/// `r` in `0..=max(rows, cols) / 2` the profile holds the mean of all cells whose
/// distance to the centre lies in `[r - 0.5, r + 0.5)`. The exact centre value
/// is emitted first, so the output has `max(rows, cols) / 2 + 2` samples and the
/// first two samples both describe the zero frequency.
///
/// A radius without member cells yields `NaN`.
pub fn radial_profile(data: &Array2<f64>) -> Vec<f64> {
    let (rows, cols) = data.dim();
    if rows == 0 || cols == 0 {
        return Vec::new();
    }

    let center_x = cols / 2;
    let center_y = rows / 2;
    let max_radius = rows.max(cols) / 2;

    let mut sums = vec![0.0; max_radius + 1];
    let mut counts = vec![0usize; max_radius + 1];

    for ((r, c), &value) in data.indexed_iter() {
        let dx = c as f64 - center_x as f64;
        let dy = r as f64 - center_y as f64;
        // dist in [k - 0.5, k + 0.5)  <=>  floor(dist + 0.5) == k
        let bin = ((dx * dx + dy * dy).sqrt() + 0.5).floor() as usize;
        if bin <= max_radius {
            sums[bin] += value;
            counts[bin] += 1;
        }
    }

    let mut profile = Vec::with_capacity(max_radius + 2);
    profile.push(data[[center_y, center_x]]);
    profile.extend(sums.iter().zip(&counts).map(|(&sum, &count)| {
        if count == 0 {
            f64::NAN
        } else {
            sum / count as f64
        }
    }));
    profile
}
